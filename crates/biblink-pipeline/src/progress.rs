//! Progress reporting for long extraction and insertion runs

use tracing::info;

/// Logs a running row count every `every` rows, plus a final line
/// when the last interval was partial
#[derive(Debug)]
pub struct ExtractProgress {
    name: &'static str,
    every: usize,
    rows: usize,
}

impl ExtractProgress {
    pub fn new(name: &'static str, every: usize) -> Self {
        Self {
            name,
            every: every.max(1),
            rows: 0,
        }
    }

    /// Count one streamed row
    pub fn row(&mut self) {
        self.rows += 1;
        if self.rows % self.every == 0 {
            self.log();
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Emit the trailing line for a partial last interval
    pub fn finish(&self) {
        if self.rows % self.every != 0 {
            self.log();
        }
    }

    fn log(&self) {
        info!("extracted {} {} record(s)", self.rows, self.name);
    }
}

/// Logs the inserted total each time it crosses a multiple of `every`
#[derive(Debug)]
pub struct InsertProgress {
    name: &'static str,
    every: usize,
    logged_steps: usize,
}

impl InsertProgress {
    pub fn new(name: &'static str, every: usize) -> Self {
        Self {
            name,
            every: every.max(1),
            logged_steps: 0,
        }
    }

    /// Report the new inserted total; returns the amount logged, if any
    pub fn update(&mut self, total: usize) -> Option<usize> {
        let steps = total / self.every;
        if steps == self.logged_steps {
            return None;
        }

        self.logged_steps = steps;
        let saved = steps * self.every;
        info!("saved {} {} record(s)", saved, self.name);
        Some(saved)
    }
}
