//! CSV rendering of the result table.
//!
//! | column          | unit | description                        |
//! |-----------------|------|------------------------------------|
//! | `name`          | --   | experiment configuration name      |
//! | `real`          | sec  | elapsed wall time                  |
//! | `user`          | sec  | CPU time in user mode              |
//! | `sys`           | sec  | CPU time in kernel mode            |
//! | `mem_total_avg` | KB   | typical memory use (unreliable)    |
//! | `mem_max`       | KB   | maximum resident memory            |
//! | `exit`          | --   | exit status, should be zero        |

use std::io::Write;

use crate::error::BenchResult;
use crate::record::Table;
use crate::store::ResultStore;

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn table_to_csv(table: &Table) -> String {
    let mut csv = table.columns.join(",");
    csv.push_str("\r\n");
    for row in &table.rows {
        let fields: Vec<String> = row.iter().map(|c| csv_field(&c.to_string())).collect();
        csv.push_str(&fields.join(","));
        csv.push_str("\r\n");
    }
    csv
}

pub fn write_csv<W: Write>(store: &ResultStore, mut writer: W) -> BenchResult<()> {
    writer.write_all(table_to_csv(&store.to_table()).as_bytes())?;
    writer.flush()?;
    Ok(())
}
