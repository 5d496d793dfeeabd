use anyhow::{anyhow, Context, Result};
use fileguard_core::shake::{AccelSample, MotionSampler};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Replays recorded accelerometer data.
///
/// One sample per line: `timestamp_ms,x,y,z`. Blank lines and lines starting
/// with `#` are skipped.
pub struct ReplaySampler {
    samples: Vec<AccelSample>,
    task: Option<JoinHandle<()>>,
}

impl ReplaySampler {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read samples {}", path.display()))?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let mut samples = Vec::new();
        for (index, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            samples.push(parse_line(line).with_context(|| format!("line {}", index + 1))?);
        }
        Ok(Self {
            samples,
            task: None,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn parse_line(line: &str) -> Result<AccelSample> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(anyhow!("expected 4 fields, got {}", fields.len()));
    }
    Ok(AccelSample {
        timestamp_ms: fields[0].parse()?,
        x: fields[1].parse()?,
        y: fields[2].parse()?,
        z: fields[3].parse()?,
    })
}

impl MotionSampler for ReplaySampler {
    fn register(&mut self, sink: mpsc::Sender<AccelSample>) -> Result<()> {
        if self.task.is_some() {
            return Err(anyhow!("sampler already registered"));
        }
        let samples = self.samples.clone();
        debug!(count = samples.len(), "replaying samples");
        self.task = Some(tokio::spawn(async move {
            for sample in samples {
                if sink.send(sample).await.is_err() {
                    warn!("sample listener went away");
                    break;
                }
            }
        }));
        Ok(())
    }

    fn unregister(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
