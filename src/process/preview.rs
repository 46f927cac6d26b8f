use arrow::{record_batch::RecordBatch, util::display::array_value_to_string};
use prettytable::{format, Cell, Row, Table};

/// Rows shown from each end of the table.
const EDGE_ROWS: usize = 5;

/// Head and tail of `batch` as a printable table, with a `[rows x columns]`
/// footer.
pub fn preview_table(batch: &RecordBatch, label: &str) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    let schema = batch.schema();
    let mut header = vec![Cell::new(label).style_spec("b")];
    header.extend(
        schema
            .fields()
            .iter()
            .map(|f| Cell::new(f.name()).style_spec("bFg")),
    );
    table.set_titles(Row::new(header));

    let n = batch.num_rows();
    let shown: Vec<usize> = if n <= 2 * EDGE_ROWS {
        (0..n).collect()
    } else {
        (0..EDGE_ROWS).chain(n - EDGE_ROWS..n).collect()
    };

    for (pos, &row) in shown.iter().enumerate() {
        if n > 2 * EDGE_ROWS && pos == EDGE_ROWS {
            let dots = (0..=batch.num_columns()).map(|_| Cell::new("...")).collect();
            table.add_row(Row::new(dots));
        }
        let mut cells = vec![Cell::new(&row.to_string())];
        for col in batch.columns() {
            let value = array_value_to_string(col, row).unwrap_or_else(|_| "?".to_string());
            cells.push(Cell::new(&value).style_spec("r"));
        }
        table.add_row(Row::new(cells));
    }

    let footer = format!("[{} rows x {} columns]", n, batch.num_columns());
    table.add_row(Row::new(vec![Cell::new(&footer).with_hspan(batch.num_columns() + 1)]));
    table
}
