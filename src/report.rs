//! Test report
//!
//! Collects one entry per case and writes `report.xml`. The finished report
//! directory is archived next to itself as a zip file.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the XML report inside the report directory
pub const REPORT_FILE: &str = "report.xml";

/// Name of the log file inside the report directory
pub const LOG_FILE: &str = "log.txt";

/// Outcome of one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

/// Accumulated case outcomes
#[derive(Debug, Default)]
pub struct Report {
    cases: Vec<CaseReport>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_case(&mut self, name: &str, passed: bool, details: &str) {
        info!(
            "Case {}: {}",
            name,
            if passed { "PASS" } else { "FAIL" }
        );
        self.cases.push(CaseReport {
            name: name.to_string(),
            passed,
            details: details.to_string(),
        });
    }

    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    pub fn pass_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn fail_count(&self) -> usize {
        self.cases.len() - self.pass_count()
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<report pass=\"{}\" fail=\"{}\">",
            self.pass_count(),
            self.fail_count()
        );
        for case in &self.cases {
            let _ = writeln!(
                out,
                "  <test name=\"{}\" result=\"{}\">{}</test>",
                escape(&case.name),
                if case.passed { "pass" } else { "fail" },
                escape(&case.details)
            );
        }
        out.push_str("</report>\n");
        out
    }

    /// Write `report.xml` into `dir`
    pub fn write_xml(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(REPORT_FILE);
        fs::write(&path, self.to_xml())?;
        debug!("Report written to {:?}", path);
        Ok(path)
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Zip every regular file in `dir` into `<dir>.zip`
pub fn archive_dir(dir: &Path) -> io::Result<PathBuf> {
    let zip_path = dir.with_extension("zip");
    let mut zip = ZipWriter::new(File::create(&zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(name, options).map_err(io::Error::other)?;
        io::copy(&mut File::open(&path)?, &mut zip)?;
    }
    zip.finish().map_err(io::Error::other)?;
    info!("Report archived to {:?}", zip_path);
    Ok(zip_path)
}
