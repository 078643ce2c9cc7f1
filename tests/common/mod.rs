#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use datagrid::{
    DataGrid, GridBuilder, GridOptions, StagingBackend,
    lines::{LineSink, ListSink},
};
use tempfile::{TempDir, tempdir};

pub const SAMPLE: &str = "id,name,w1,w2\n1,Alpha,15.2,14.9\n2,Beta,,14.1\n";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Directory the grids of this workspace stage into.
    pub fn staging_dir(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("staging");
        fs::create_dir_all(&dir).expect("create staging dir");
        dir
    }

    /// Options that stage into this workspace instead of the shared temp dir.
    pub fn options(&self) -> GridOptions {
        let mut options = GridOptions::default();
        options.staging.dir = Some(self.staging_dir());
        options
    }

    pub fn memory_options(&self) -> GridOptions {
        self.options().with_backend(StagingBackend::Memory)
    }

    pub fn builder(&self) -> GridBuilder {
        GridBuilder::new().options(self.options())
    }

    pub fn grid(&self, text: &str) -> DataGrid {
        self.builder().from_text(text).expect("load grid")
    }

    /// Files currently present in the staging directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        let mut files = fs::read_dir(self.staging_dir())
            .expect("read staging dir")
            .map(|entry| entry.expect("dir entry").path())
            .collect::<Vec<_>>();
        files.sort();
        files
    }
}

/// Header followed by every row of the grid.
pub fn rows(grid: &DataGrid) -> Vec<Vec<String>> {
    let mut sink = ListSink::new();
    grid.persist(&mut sink).expect("persist grid");
    sink.close().expect("close sink");
    sink.into_rows()
}

/// Values of one column, header excluded.
pub fn column(grid: &DataGrid, name: &str) -> Vec<String> {
    let idx = grid
        .columns()
        .iter()
        .position(|c| c == name)
        .expect("column exists");
    rows(grid).into_iter().skip(1).map(|row| row[idx].clone()).collect()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
