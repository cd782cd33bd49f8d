//! Per-run output files (spec.md §6 "Persisted state").
//!
//! All files are opened (truncating anything already there) at startup,
//! before any worker thread is spawned; a failure to open any of them is
//! fatal (spec.md §7 error kind 5). Writers are flushed and dropped on
//! clean shutdown.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Candlestick;

/// One `Price\tVolume\tTime` log plus the two candlestick/SMA logs, for a
/// single symbol.
struct SymbolFiles {
    trades: BufWriter<File>,
    candlestick: BufWriter<File>,
    sma_volume: BufWriter<File>,
}

/// Owns every output file the pipeline writes to.
pub struct Outputs {
    symbols: Vec<SymbolFiles>,
    gap_log: BufWriter<File>,
    fin_to_pro_delay_log: BufWriter<File>,
    pro_to_con_delay_log: BufWriter<File>,
}

fn create(dir: &Path, name: &str) -> Result<BufWriter<File>> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufWriter::new(file))
}

impl Outputs {
    /// Creates and headers every output file for the given symbol table.
    pub fn create(dir: &Path, symbols: &[String]) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let mut symbol_files = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let mut trades = create(dir, &format!("{symbol}.txt"))?;
            writeln!(trades, "Price\t\tVolume\t\tTime")?;

            let mut candlestick = create(dir, &format!("{symbol}_candlestick.txt"))?;
            writeln!(candlestick, "Open\t\tClose\t\tHigh\t\tLow\t\tVolume")?;

            let mut sma_volume = create(dir, &format!("{symbol}_sma_volume.txt"))?;
            writeln!(sma_volume, "SMA\t\tVolume")?;

            symbol_files.push(SymbolFiles {
                trades,
                candlestick,
                sma_volume,
            });
        }

        let mut gap_log = create(dir, "candlestick_time_differences.txt")?;
        let mut fin_to_pro_delay_log = create(dir, "finnhub_producer_delay.txt")?;
        let mut pro_to_con_delay_log = create(dir, "producer_consumer_delay.txt")?;

        for header in [&mut gap_log, &mut fin_to_pro_delay_log, &mut pro_to_con_delay_log] {
            for symbol in symbols {
                write!(header, "{symbol}\t")?;
            }
            writeln!(header)?;
        }

        Ok(Self {
            symbols: symbol_files,
            gap_log,
            fin_to_pro_delay_log,
            pro_to_con_delay_log,
        })
    }

    /// Appends one raw-tick line to symbol `i`'s trade log.
    pub fn write_trade(&mut self, i: usize, price: f64, volume: f64, event_time_ms: i64) -> Result<()> {
        writeln!(self.symbols[i].trades, "{price:.4}\t{volume:.4}\t\t{event_time_ms}")?;
        Ok(())
    }

    /// Writes one full tab-separated row (one cell per symbol, 0 for a
    /// non-matching symbol) to the finnhub→producer delay log.
    pub fn write_fin_to_pro_row(&mut self, cells_ms: &[i64]) -> Result<()> {
        write_row(&mut self.fin_to_pro_delay_log, cells_ms)
    }

    /// Same shape, for the producer→consumer delay log (microseconds).
    pub fn write_pro_to_con_row(&mut self, cells_us: &[i64]) -> Result<()> {
        write_row(&mut self.pro_to_con_delay_log, cells_us)
    }

    /// Writes the candlestick line for symbol `i`, or the `no_data`
    /// sentinel on a starved minute.
    pub fn write_candlestick(&mut self, i: usize, candle: Option<&Candlestick>) -> Result<()> {
        let w = &mut self.symbols[i].candlestick;
        match candle {
            Some(c) => writeln!(
                w,
                "{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}",
                c.open, c.close, c.high, c.low, c.volume
            )?,
            None => writeln!(w, "no_data")?,
        }
        Ok(())
    }

    /// Writes the SMA/volume line for symbol `i`, or `no_data`.
    pub fn write_sma_volume(&mut self, i: usize, values: Option<(f64, f64)>) -> Result<()> {
        let w = &mut self.symbols[i].sma_volume;
        match values {
            Some((sma, vol)) => writeln!(w, "{sma:.4}\t{vol:.4}")?,
            None => writeln!(w, "no_data")?,
        }
        Ok(())
    }

    /// Writes one full row to the inter-emit gap log (0 on skip).
    pub fn write_gap_row(&mut self, cells_us: &[i64]) -> Result<()> {
        write_row(&mut self.gap_log, cells_us)
    }

    /// Flushes every open writer. Called on shutdown before the process
    /// exits (spec.md §4.6).
    pub fn flush_all(&mut self) -> Result<()> {
        for s in &mut self.symbols {
            s.trades.flush()?;
            s.candlestick.flush()?;
            s.sma_volume.flush()?;
        }
        self.gap_log.flush()?;
        self.fin_to_pro_delay_log.flush()?;
        self.pro_to_con_delay_log.flush()?;
        Ok(())
    }
}

fn write_row(w: &mut BufWriter<File>, cells: &[i64]) -> Result<()> {
    for cell in cells {
        write!(w, "{cell}\t")?;
    }
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_headers_for_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let symbols = vec!["AAPL".to_string(), "NVDA".to_string()];
        let mut out = Outputs::create(dir.path(), &symbols).unwrap();

        out.write_trade(0, 190.5, 3.0, 1_700_000_000_000).unwrap();
        out.write_candlestick(0, Some(&Candlestick { open: 1.0, close: 2.0, high: 2.0, low: 1.0, volume: 3.0, empty: false })).unwrap();
        out.write_candlestick(1, None).unwrap();
        out.write_sma_volume(0, Some((12.7, 3.0))).unwrap();
        out.write_gap_row(&[0, 0]).unwrap();
        out.write_fin_to_pro_row(&[5, 0]).unwrap();
        out.write_pro_to_con_row(&[0, 5]).unwrap();
        out.flush_all().unwrap();

        let aapl = std::fs::read_to_string(dir.path().join("AAPL.txt")).unwrap();
        assert!(aapl.starts_with("Price\t\tVolume\t\tTime\n"));
        assert!(aapl.contains("190.5000\t3.0000\t\t1700000000000"));

        let nvda_candles = std::fs::read_to_string(dir.path().join("NVDA_candlestick.txt")).unwrap();
        assert!(nvda_candles.ends_with("no_data\n"));
    }
}
