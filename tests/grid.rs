mod common;

use common::{SAMPLE, TestWorkspace, column, rows, strings};
use datagrid::{
    Action, Column, ColumnError, ColumnType, ConversionError, GridError, JoinSpec, Rounding,
    Sorting, Value,
    codec::RowCodec,
    lines::{ListSink, TextSource},
};

const PEOPLE: &str = "id,name,city\n1,Ann,Oslo\n2,Bob,Rome\n3,Cid,Oslo\n4,Dee,Lima\n";

#[test]
fn missing_values_as_zero_keep_the_filter_total() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace
        .builder()
        .options(workspace.options().with_missing_as_zero(true))
        .from_text(SAMPLE)
        .unwrap();

    let report = grid.filter(|row| Ok(row.double("w1")? != 0.0)).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.rows_read, 2);
    assert_eq!(grid.row_count(), 1);
    assert_eq!(column(&grid, "id"), strings(&["1"]));
}

#[test]
fn missing_values_without_substitution_are_recorded() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(SAMPLE);

    let report = grid.filter(|row| Ok(row.double("w1")? != 0.0)).unwrap();

    assert_eq!(grid.row_count(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, 2);
    assert_eq!(report.errors[0].error.ty, ColumnType::Double);
    assert!(matches!(
        report.into_result(),
        Err(GridError::RowErrors { operation: "filter", count: 1 })
    ));
}

#[test]
fn filter_is_monotone_and_true_is_identity() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let before = rows(&grid);

    grid.filter(|_| Ok(true)).unwrap();
    assert_eq!(rows(&grid), before);

    grid.filter(|row| Ok(row.raw("city")? == "Oslo")).unwrap();
    let after_city = grid.row_count();
    grid.filter(|row| Ok(row.long("id")? > 1)).unwrap();

    assert!(grid.row_count() <= after_city);
    assert_eq!(column(&grid, "name"), strings(&["Cid"]));
}

#[test]
fn unknown_column_aborts_and_keeps_the_grid() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let before = rows(&grid);

    let err = grid.filter(|row| Ok(row.raw("nope")?.is_empty())).unwrap_err();

    match &err {
        GridError::Operation { operation, row, .. } => {
            assert_eq!(*operation, "filter");
            assert_eq!(*row, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(
        err.root(),
        GridError::Column(ColumnError::NotFound(name)) if name == "nope"
    ));
    assert_eq!(rows(&grid), before);
    assert_eq!(workspace.staged_files().len(), 1);
}

#[test]
fn each_commit_releases_the_previous_stage() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let first = grid.stage_path().unwrap().to_path_buf();

    grid.filter(|row| Ok(row.raw("city")? != "Lima")).unwrap();
    grid.sort(&[Sorting::desc(Column::long("id"))]).unwrap();

    assert!(!first.exists());
    let staged = workspace.staged_files();
    assert_eq!(staged.len(), 1);
    assert_eq!(Some(staged[0].as_path()), grid.stage_path());

    drop(grid);
    assert!(workspace.staged_files().is_empty());
}

#[test]
fn memory_backend_stages_nothing_on_disk() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace
        .builder()
        .options(workspace.memory_options())
        .from_text(PEOPLE)
        .unwrap();
    grid.sort(&[Sorting::asc(Column::text("name"))]).unwrap();

    assert!(grid.stage_path().is_none());
    assert!(workspace.staged_files().is_empty());
    assert_eq!(column(&grid, "id"), strings(&["1", "2", "3", "4"]));
}

#[test]
fn stale_stages_from_other_processes_are_swept() {
    let workspace = TestWorkspace::new();
    let dir = workspace.staging_dir();
    let stale = dir.join("datagrid_4000000001_abc123.csv");
    let unrelated = dir.join("notes.txt");
    std::fs::write(&stale, "id\n1\n").unwrap();
    std::fs::write(&unrelated, "keep me").unwrap();

    let grid = workspace.grid(PEOPLE);

    assert!(!stale.exists());
    assert!(unrelated.exists());
    assert_eq!(grid.row_count(), 4);
}

#[cfg(target_os = "linux")]
#[test]
fn stages_of_running_processes_survive_the_sweep() {
    let workspace = TestWorkspace::new();
    let live = workspace
        .staging_dir()
        .join(format!("datagrid_{}_abc123.csv", std::os::unix::process::parent_id()));
    std::fs::write(&live, "id\n1\n").unwrap();

    let grid = workspace.grid(PEOPLE);

    assert!(live.exists());
    assert_eq!(grid.row_count(), 4);
}

#[test]
fn column_projections_partition_the_header() {
    let workspace = TestWorkspace::new();
    let mut kept = workspace.grid(PEOPLE);
    let mut dropped = workspace.grid(PEOPLE);

    kept.include_columns(&["city", "id"]).unwrap();
    dropped.exclude_columns(&["city", "id"]).unwrap();

    assert_eq!(kept.columns(), ["id", "city"]);
    assert_eq!(dropped.columns(), ["name"]);
    assert_eq!(kept.row_count(), 4);
    assert_eq!(column(&kept, "city"), strings(&["Oslo", "Rome", "Oslo", "Lima"]));
}

#[test]
fn column_ranges_select_contiguous_blocks() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(SAMPLE);
    grid.include_column_range("w2", "name").unwrap();
    assert_eq!(grid.columns(), ["name", "w1", "w2"]);

    grid.exclude_column_range("w1", "w2").unwrap();
    assert_eq!(grid.columns(), ["name"]);
    assert_eq!(column(&grid, "name"), strings(&["Alpha", "Beta"]));
}

#[test]
fn excluding_every_column_is_rejected() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    assert!(grid.exclude_columns(&["id", "name", "city"]).is_err());
    assert_eq!(grid.columns(), ["id", "name", "city"]);
}

#[test]
fn row_ranges_are_one_based_and_inclusive() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    grid.include_rows(2, 3).unwrap();
    assert_eq!(column(&grid, "id"), strings(&["2", "3"]));

    let mut open = workspace.grid(PEOPLE);
    open.exclude_rows(2, 0).unwrap();
    assert_eq!(column(&open, "id"), strings(&["1"]));

    assert!(matches!(open.include_rows(0, 1), Err(GridError::InvalidArgument(_))));
    assert!(matches!(open.include_rows(3, 2), Err(GridError::InvalidArgument(_))));
}

#[test]
fn sort_is_stable_in_both_directions() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    grid.sort(&[Sorting::asc(Column::text("city"))]).unwrap();
    assert_eq!(column(&grid, "id"), strings(&["4", "1", "3", "2"]));

    let mut grid = workspace.grid(PEOPLE);
    grid.sort(&[Sorting::desc(Column::text("city"))]).unwrap();
    assert_eq!(column(&grid, "id"), strings(&["2", "1", "3", "4"]));
}

#[test]
fn sort_is_idempotent_and_uses_later_keys_for_ties() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let keys = [
        Sorting::asc(Column::text("city")),
        Sorting::desc(Column::long("id")),
    ];
    grid.sort(&keys).unwrap();
    let once = rows(&grid);
    grid.sort(&keys).unwrap();

    assert_eq!(rows(&grid), once);
    assert_eq!(column(&grid, "id"), strings(&["4", "3", "1", "2"]));
}

#[test]
fn spilled_runs_merge_to_the_in_memory_order() {
    let workspace = TestWorkspace::new();
    let mut text = String::from("id,score\n");
    for id in 1..=50 {
        text.push_str(&format!("{id},{}\n", (id * 37) % 11));
    }
    let keys = [Sorting::asc(Column::long("score"))];

    let mut in_memory = workspace.grid(&text);
    in_memory.sort(&keys).unwrap();

    let mut options = workspace.options();
    options.sort_chunk_rows = 7;
    let mut spilled = workspace.builder().options(options).from_text(text).unwrap();
    let report = spilled.sort(&keys).unwrap();

    assert_eq!(report.rows_written, 50);
    assert_eq!(rows(&spilled), rows(&in_memory));
    let scores = column(&spilled, "score")
        .iter()
        .map(|s| s.parse::<i64>().unwrap())
        .collect::<Vec<_>>();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(workspace.staged_files().len(), 2);
}

#[test]
fn unconvertible_sort_keys_come_first() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid("id,w\n1,5\n2,\n3,1\n4,x\n");
    let report = grid.sort(&[Sorting::desc(Column::double("w"))]).unwrap();

    // The empty cell fails to convert; "x" reads back as text, which ranks above numbers.
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, 2);
    assert_eq!(column(&grid, "id"), strings(&["2", "4", "1", "3"]));
    assert_eq!(grid.row_count(), 4);
}

#[test]
fn join_keeps_every_row_and_suffixes_columns() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let right = "key,score\n1,10\n2,20\n2,25\n9,90\n";

    let mut source = TextSource::from_text(right, RowCodec::default());
    let report = grid.join_with(&mut source, &JoinSpec::new("key", "id")).unwrap();

    assert_eq!(report.rows_written, 4);
    assert_eq!(grid.columns(), ["id", "name", "city", "key_1", "score_1"]);
    assert_eq!(column(&grid, "score_1"), strings(&["10", "25", "", ""]));

    let mut again = TextSource::from_text(right, RowCodec::default());
    grid.join_with(&mut again, &JoinSpec::new("key", "id")).unwrap();
    assert_eq!(grid.join_counter(), 2);
    assert_eq!(
        grid.columns(),
        ["id", "name", "city", "key_1", "score_1", "key_2", "score_2"]
    );
}

#[test]
fn join_places_columns_around_a_reference() {
    let workspace = TestWorkspace::new();
    let right = "id,zone\n1,north\n3,south\n";

    let mut before = workspace.grid(PEOPLE);
    let mut source = TextSource::from_text(right, RowCodec::default());
    before
        .join_with(&mut source, &JoinSpec::new("id", "id").placed(Action::Before, "name"))
        .unwrap();
    assert_eq!(before.columns(), ["id", "id_1", "zone_1", "name", "city"]);

    let mut replaced = workspace.grid(PEOPLE);
    let mut source = TextSource::from_text(right, RowCodec::default());
    replaced
        .join_with(&mut source, &JoinSpec::new("id", "id").placed(Action::Replace, "city"))
        .unwrap();
    assert_eq!(replaced.columns(), ["id", "name", "id_1", "zone_1"]);
    assert_eq!(column(&replaced, "zone_1"), strings(&["north", "", "south", ""]));
}

#[test]
fn failed_join_leaves_the_counter_alone() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let mut source = TextSource::from_text("key,score\n1,10\n", RowCodec::default());

    let err = grid.join_with(&mut source, &JoinSpec::new("missing", "id")).unwrap_err();

    assert!(matches!(err, GridError::Column(ColumnError::NotFound(_))));
    assert_eq!(grid.join_counter(), 0);
    assert_eq!(grid.columns(), ["id", "name", "city"]);
}

#[test]
fn process_inserts_a_rounded_column() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace
        .builder()
        .options(workspace.options().with_missing_as_zero(true))
        .from_text(SAMPLE)
        .unwrap();

    let report = grid
        .process(
            |row| Ok(Some(Value::Double(row.double("w1")? + row.double("w2")?))),
            &Column::double("total"),
            Action::After,
            Some("name"),
            Some(Rounding::half_up(1)),
        )
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(grid.columns(), ["id", "name", "total", "w1", "w2"]);
    assert_eq!(column(&grid, "total"), strings(&["30.1", "14.1"]));
}

#[test]
fn process_records_failures_as_empty_cells() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(SAMPLE);

    let report = grid
        .process(
            |row| Ok(Some(Value::Double(row.double("w1")? * 2.0))),
            &Column::double("double_w1"),
            Action::After,
            None,
            None,
        )
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(column(&grid, "double_w1"), strings(&["30.4", ""]));
}

#[test]
fn process_overwrites_in_place_and_none_keeps_the_cell() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);

    grid.process(
        |row| {
            let city = row.text("city")?;
            Ok((city == "Oslo").then(|| Value::Text(city.to_uppercase())))
        },
        &Column::text("city"),
        Action::After,
        None,
        None,
    )
    .unwrap();

    assert_eq!(grid.columns(), ["id", "name", "city"]);
    assert_eq!(column(&grid, "city"), strings(&["OSLO", "Rome", "OSLO", "Lima"]));
}

#[test]
fn process_replace_swaps_the_reference_column() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);

    grid.process(
        |row| Ok(Some(Value::Long(row.long("id")? * 100))),
        &Column::long("hundreds"),
        Action::Replace,
        Some("id"),
        None,
    )
    .unwrap();

    assert_eq!(grid.columns(), ["hundreds", "name", "city"]);
    assert_eq!(column(&grid, "hundreds"), strings(&["100", "200", "300", "400"]));
}

#[test]
fn process_rejects_a_name_that_would_repeat() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace.grid(PEOPLE);
    let err = grid
        .process(
            |_| Ok(None),
            &Column::text("name"),
            Action::Before,
            Some("id"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, GridError::DuplicateColumn(name) if name == "name"));
}

#[test]
fn row_access_is_one_based() {
    let workspace = TestWorkspace::new();
    let grid = workspace.grid(PEOPLE);

    assert_eq!(grid.row(2).unwrap(), strings(&["2", "Bob", "Rome"]));
    assert!(matches!(grid.row(0), Err(GridError::RowNotFound(0))));
    assert!(matches!(grid.row(5), Err(GridError::RowNotFound(5))));

    let values = grid
        .extract_row_values(3, &[Column::long("id"), Column::text("city")])
        .unwrap();
    assert_eq!(values, vec![Value::Long(3), Value::Text("Oslo".into())]);
}

#[test]
fn column_extraction_reports_the_failing_row() {
    let workspace = TestWorkspace::new();
    let grid = workspace.grid(SAMPLE);

    let err = grid.extract_column_values(&Column::double("w1")).unwrap_err();
    assert!(matches!(
        err,
        GridError::Operation { operation: "extract_column_values", row: 2, .. }
    ));
    assert!(matches!(err.root(), GridError::Conversion(ConversionError { .. })));

    let values = grid.extract_column_values(&Column::double("w2")).unwrap();
    assert_eq!(values, vec![Value::Double(14.9), Value::Double(14.1)]);
}

#[test]
fn construction_validates_the_header() {
    let workspace = TestWorkspace::new();
    assert!(matches!(
        workspace.builder().from_text("a,b,a\n1,2,3\n"),
        Err(GridError::DuplicateColumn(name)) if name == "a"
    ));
    assert!(matches!(workspace.builder().from_text(""), Err(GridError::EmptyDataset)));

    let err = workspace.builder().from_text("a,b\n1,2\n1,2,3\n").unwrap_err();
    assert!(matches!(err, GridError::Operation { operation: "load", row: 2, .. }));
    assert!(matches!(err.root(), GridError::InvalidArgument(_)));
}

#[test]
fn short_rows_are_padded_on_load() {
    let workspace = TestWorkspace::new();
    let grid = workspace.grid("a,b,c\n1\n2,3\n");
    assert_eq!(grid.row(1).unwrap(), strings(&["1", "", ""]));
    assert_eq!(grid.row(2).unwrap(), strings(&["2", "3", ""]));
}

#[test]
fn grids_build_from_rows_and_columns() {
    let workspace = TestWorkspace::new();
    let by_rows = workspace
        .builder()
        .from_rows(vec![strings(&["k", "v"]), strings(&["a", "1"])])
        .unwrap();
    assert_eq!(rows(&by_rows), vec![strings(&["k", "v"]), strings(&["a", "1"])]);

    let by_columns = workspace
        .builder()
        .from_columns(vec![
            ("id".to_string(), strings(&["1", "2"])),
            ("name".to_string(), strings(&["x"])),
        ])
        .unwrap();
    assert_eq!(by_columns.row_count(), 2);
    assert_eq!(column(&by_columns, "name"), strings(&["x", ""]));

    assert!(matches!(
        workspace.builder().from_columns(Vec::new()),
        Err(GridError::EmptyDataset)
    ));
}

#[test]
fn registered_converters_override_the_defaults() {
    let workspace = TestWorkspace::new();
    let mut grid = workspace
        .builder()
        .register_input(ColumnType::Boolean, |raw| Ok(Value::Boolean(raw.trim() == "si")))
        .from_text("name,active\nAnn,si\nBob,no\nCid,si\n")
        .unwrap();

    grid.filter(|row| row.boolean("active")).unwrap();

    assert_eq!(column(&grid, "name"), strings(&["Ann", "Cid"]));
}

#[test]
fn persist_writes_header_and_rows() {
    let workspace = TestWorkspace::new();
    let grid = workspace.grid("id,note\n1,\"two\nlines\"\n2,\"a,b\"\n");

    let mut sink = ListSink::new();
    let written = grid.persist(&mut sink).unwrap();

    assert_eq!(written, 2);
    assert_eq!(
        sink.into_rows(),
        vec![
            strings(&["id", "note"]),
            strings(&["1", "two\nlines"]),
            strings(&["2", "a,b"]),
        ]
    );
}

#[test]
fn persisted_files_reload_with_the_same_rows() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("out.csv");
    let grid = workspace.grid(PEOPLE);

    let mut sink = datagrid::lines::FileSink::create(&path, RowCodec::default()).unwrap();
    grid.persist(&mut sink).unwrap();

    let reloaded = workspace.builder().from_path(&path).unwrap();
    assert_eq!(rows(&reloaded), rows(&grid));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), PEOPLE);
}

#[test]
fn print_rows_honours_the_limit_and_numbering() {
    let workspace = TestWorkspace::new();
    let grid = workspace.grid(PEOPLE);

    let mut out = Vec::new();
    let printed = grid.print_rows(&mut out, Some(2), true).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(printed, 2);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains('#'));
    assert!(lines[2].contains("Ann"));
    assert!(!text.contains("Cid"));
}
