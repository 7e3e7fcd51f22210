//! Rendering of finished rounds.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{CellAlignment, Table};
use s3bench_service::{HEADER, Stats};

/// The statistics of all finished rounds, in the order they ran.
#[derive(Debug, Default)]
pub struct Report {
    rounds: Vec<Stats>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stats: Stats) {
        self.rounds.push(stats);
    }

    pub fn rounds(&self) -> &[Stats] {
        &self.rounds
    }

    /// Renders all rounds as a table, one row per round.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(HEADER.to_vec());
        for stats in &self.rounds {
            table.add_row(stats.data());
        }

        // right-align every column after the title
        for index in 1..HEADER.len() {
            if let Some(column) = table.column_mut(index) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }
        table
    }

    /// Prints the table to stderr, keeping stdout free for CSV output.
    pub fn print_table(&self) {
        eprintln!("{}", self.table());
    }

    /// Writes the header and one record per round as CSV.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(HEADER)?;
        for stats in &self.rounds {
            writer.write_record(stats.data())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes CSV to the file at `path`, or to stdout if `path` is `-`.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        if path == Path::new("-") {
            return self.write_csv(io::stdout().lock());
        }

        let file = File::create(path)
            .with_context(|| format!("failed to create CSV file {}", path.display()))?;
        self.write_csv(file)
    }
}
