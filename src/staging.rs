//! Staged snapshots of a grid's dataset.
//!
//! A [`StageArena`] owns at most one committed [`Stage`] at a time. Writing a
//! new stage never touches the current one; committing swaps the pointer and
//! drops the superseded stage, which removes its file. Temp-file stages are
//! named `{prefix}{pid}_XXXXXX.csv` so that a later process can recognise and
//! sweep files a crashed run left behind.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Cursor, Write},
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, SystemTime},
};

use log::debug;
use tempfile::TempPath;

use crate::{
    codec::RowCodec,
    config::{StagingBackend, StagingOptions},
    error::{GridError, Result},
    lines::{FileSource, LineSink, ReaderSource, WriterSink},
};

#[derive(Debug)]
enum Storage {
    File(TempPath),
    Memory(Rc<[u8]>),
}

/// A finished snapshot: header plus rows, encoded with the arena's codec.
#[derive(Debug)]
pub struct Stage {
    storage: Storage,
    rows: usize,
}

impl Stage {
    /// Rows written to the stage, header included.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(path) => Some(path.as_ref()),
            Storage::Memory(_) => None,
        }
    }

    pub fn open(&self, codec: RowCodec) -> Result<FileSource> {
        match &self.storage {
            Storage::File(path) => {
                let file = File::open(path)
                    .map_err(|err| GridError::io(format!("Opening stage {path:?}"), err))?;
                let reader: Box<dyn BufRead> = Box::new(BufReader::new(file));
                Ok(ReaderSource::new(reader, codec))
            }
            Storage::Memory(bytes) => {
                let reader: Box<dyn BufRead> = Box::new(Cursor::new(Rc::clone(bytes)));
                Ok(ReaderSource::new(reader, codec))
            }
        }
    }
}

enum Target {
    File {
        sink: WriterSink<BufWriter<File>>,
        path: TempPath,
    },
    Memory(WriterSink<Vec<u8>>),
}

/// Sink for a stage under construction. Dropping it without calling
/// [`StageWriter::finish`] discards the partial stage.
pub struct StageWriter {
    target: Target,
    rows: usize,
}

impl StageWriter {
    pub fn finish(self) -> Result<Stage> {
        let storage = match self.target {
            Target::File { sink, path } => {
                if let Some(mut file) = sink.into_inner()? {
                    file.flush()
                        .map_err(|err| GridError::io(format!("Flushing stage {path:?}"), err))?;
                }
                Storage::File(path)
            }
            Target::Memory(sink) => Storage::Memory(sink.into_inner()?.unwrap_or_default().into()),
        };
        Ok(Stage {
            storage,
            rows: self.rows,
        })
    }
}

impl LineSink for StageWriter {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        match &mut self.target {
            Target::File { sink, .. } => sink.write_row(row)?,
            Target::Memory(sink) => sink.write_row(row)?,
        }
        self.rows += 1;
        Ok(())
    }

    /// The stage is sealed by [`StageWriter::finish`], not here.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct StageArena {
    backend: StagingBackend,
    dir: PathBuf,
    prefix: String,
    codec: RowCodec,
    current: Option<Stage>,
    committed: usize,
}

impl StageArena {
    pub fn new(options: &StagingOptions, codec: RowCodec) -> Result<Self> {
        let dir = match &options.dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|err| GridError::io(format!("Creating staging directory {dir:?}"), err))?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };
        let arena = Self {
            backend: options.backend,
            dir,
            prefix: options.prefix.clone(),
            codec,
            current: None,
            committed: 0,
        };
        if arena.backend == StagingBackend::TempFile && options.sweep_stale {
            arena.sweep_stale();
        }
        Ok(arena)
    }

    pub fn backend(&self) -> StagingBackend {
        self.backend
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn codec(&self) -> RowCodec {
        self.codec
    }

    /// Number of stages committed over the arena's lifetime.
    pub fn generation(&self) -> usize {
        self.committed
    }

    pub fn current(&self) -> Option<&Stage> {
        self.current.as_ref()
    }

    pub fn open_current(&self) -> Result<FileSource> {
        self.current
            .as_ref()
            .ok_or(GridError::EmptyDataset)?
            .open(self.codec)
    }

    pub fn create(&self) -> Result<StageWriter> {
        let target = match self.backend {
            StagingBackend::TempFile => {
                let file = tempfile::Builder::new()
                    .prefix(&self.file_prefix())
                    .suffix(".csv")
                    .tempfile_in(&self.dir)
                    .map_err(|err| GridError::io(format!("Creating stage in {:?}", self.dir), err))?;
                let (file, path) = file.into_parts();
                debug!("Staging rows to {path:?}");
                Target::File {
                    sink: WriterSink::new(BufWriter::new(file), self.codec),
                    path,
                }
            }
            StagingBackend::Memory => Target::Memory(WriterSink::new(Vec::new(), self.codec)),
        };
        Ok(StageWriter { target, rows: 0 })
    }

    /// Makes `stage` current and releases the one it supersedes.
    pub fn commit(&mut self, stage: Stage) {
        if let Some(previous) = self.current.replace(stage) {
            if let Some(path) = previous.path() {
                debug!("Releasing superseded stage {path:?}");
            }
        }
        self.committed += 1;
    }

    fn file_prefix(&self) -> String {
        format!("{}{}_", self.prefix, std::process::id())
    }

    /// Best-effort removal of files under the arena prefix whose owning
    /// process has exited. Files of a live process are left alone; without
    /// `/proc` a file counts as stale once it has been idle for
    /// [`STALE_AFTER`]. Returns the number of files removed.
    pub fn sweep_stale(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let own_pid = std::process::id();
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|name| stage_pid(name, &self.prefix)) else {
                continue;
            };
            if pid == own_pid || !is_stale(&entry, pid) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Swept stale stage {:?}", entry.path());
                    removed += 1;
                }
                Err(err) => debug!("Could not sweep {:?}: {err}", entry.path()),
            }
        }
        removed
    }
}

/// Idle time after which a stage file of an unknown owner is swept.
pub const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

fn is_stale(entry: &fs::DirEntry, pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        let alive = proc_root.join(pid.to_string()).exists();
        if alive {
            debug!("Keeping stage {:?} of running process {pid}", entry.path());
        }
        return !alive;
    }
    entry
        .metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|idle| idle >= STALE_AFTER)
}

/// Process id encoded in a stage file name, if `name` is one of ours.
fn stage_pid(name: &str, prefix: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?.strip_suffix(".csv")?;
    let (pid, _) = rest.split_once('_')?;
    pid.parse().ok()
}
