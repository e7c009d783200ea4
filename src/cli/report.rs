//! Human-readable run report

use std::io::{self, Write};

use putusan_dl::{RunReport, StopReason};

/// Write the census, failures and stop reason to `out`
pub fn write_report<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    writeln!(out, "📊 Pages crawled: {}", report.census.len())?;
    for (page, links) in &report.census {
        writeln!(out, "   page {page}: {links} documents")?;
    }
    writeln!(
        out,
        "☁️  Stored {} of {} documents",
        report.stored.len(),
        report.total_links()
    )?;

    if !report.failures.is_empty() {
        writeln!(out, "⚠️  Failures: {}", report.failures.len())?;
        for (key, failure) in &report.failures {
            writeln!(out, "   [page {}] {key}: {}", failure.page, failure.reason)?;
        }
    }

    match report.stop {
        Some(StopReason::EmptyPage(page)) => writeln!(out, "🏁 Stopped at empty page {page}")?,
        Some(StopReason::EndPageReached(page)) => writeln!(out, "🏁 Stopped after end page {page}")?,
        None => writeln!(out, "🛑 Run did not finish")?,
    }
    Ok(())
}

/// Print the report to stderr
pub fn print_report(report: &RunReport) {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    // stderr is best effort; a closed pipe must not mask the run's outcome
    let _ = write_report(&mut out, report);
}
