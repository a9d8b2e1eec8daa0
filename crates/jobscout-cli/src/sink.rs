use std::io::Write;

use jobscout_core::AppError;
use jobscout_core::models::DiscoveredJob;
use jobscout_core::traits::JobSink;

/// Writes each job as one JSON object per line.
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write + Send + Sync> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + Sync> JobSink for JsonLinesSink<W> {
    fn store(&mut self, jobs: &[DiscoveredJob]) -> Result<usize, AppError> {
        for job in jobs {
            serde_json::to_writer(&mut self.out, job)?;
            self.out
                .write_all(b"\n")
                .map_err(|e| AppError::Generic(format!("Failed to write job: {e}")))?;
        }
        self.out
            .flush()
            .map_err(|e| AppError::Generic(format!("Failed to flush output: {e}")))?;
        Ok(jobs.len())
    }
}

/// Writes jobs as CSV rows, with a header before the first row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write + Send + Sync> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W, AppError> {
        self.writer
            .into_inner()
            .map_err(|e| AppError::Generic(format!("Failed to flush CSV output: {e}")))
    }
}

impl<W: Write + Send + Sync> JobSink for CsvSink<W> {
    fn store(&mut self, jobs: &[DiscoveredJob]) -> Result<usize, AppError> {
        for job in jobs {
            self.writer
                .serialize(job)
                .map_err(|e| AppError::Generic(format!("Failed to write CSV row: {e}")))?;
        }
        self.writer
            .flush()
            .map_err(|e| AppError::Generic(format!("Failed to flush CSV output: {e}")))?;
        Ok(jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobscout_core::models::JobSource;

    fn job(url: &str, title: &str) -> DiscoveredJob {
        DiscoveredJob {
            url: url.into(),
            title: title.into(),
            company: "Acme, Inc.".into(),
            location: "Remote".into(),
            description: String::new(),
            platform: "lever".into(),
            validation_confidence: 0.8,
            source: JobSource::Listing,
        }
    }

    #[test]
    fn json_lines_one_object_per_job() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let stored = sink
            .store(&[job("https://a/1", "Engineer"), job("https://a/2", "Designer")])
            .unwrap();
        assert_eq!(stored, 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["title"], "Engineer");
        assert_eq!(first["source"], "listing");
    }

    #[test]
    fn csv_writes_header_once_and_quotes_commas() {
        let mut sink = CsvSink::new(Vec::new());
        sink.store(&[job("https://a/1", "Engineer")]).unwrap();
        sink.store(&[job("https://a/2", "Designer")]).unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("url,title,company,location"));
        assert!(lines[1].contains("\"Acme, Inc.\""));
        assert!(lines[2].ends_with(",listing"));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let mut sink = CsvSink::new(Vec::new());
        assert_eq!(sink.store(&[]).unwrap(), 0);
        assert!(sink.into_inner().unwrap().is_empty());
    }
}
