//! Test to verify test infrastructure works correctly

mod common;

use common::builders::{RowBuilder, TableBuilder};
use forcebridge_rs::parser::{read_table, Cell, DataLines};

#[test]
fn test_table_builder_round_trips_through_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = TableBuilder::new()
        .row(RowBuilder::new("Fx", "Tower.Fx").values(&[1.0, 2.0]))
        .write(dir.path(), "t.csv");

    let rows = read_table(&path, DataLines::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].line, 2);
    assert_eq!(rows[0].cells.len(), 10);
    assert_eq!(rows[0].cells[0].as_text(), "Fx");
    assert!(matches!(rows[0].cells[1], Cell::Empty));
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
