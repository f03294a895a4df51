//! Concurrent processing of independent documents
//!
//! Each document is parsed on the blocking pool by exactly one thread; a
//! semaphore bounds how many run at once, and submission blocks while the
//! pool is full.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::numeric::usize_to_f64;
use crate::pipeline::{ParseOptions, ParseResult, Pipeline};
use crate::{Error, Result};

/// Configuration for concurrent processing
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum number of documents parsed in parallel
    pub max_concurrency: usize,
    /// Timeout for one document
    pub message_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            message_timeout: Duration::from_secs(30),
        }
    }
}

impl StreamConfig {
    /// Concurrency taken from the pipeline's defaults
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            max_concurrency: pipeline.config().max_concurrency,
            ..Self::default()
        }
    }
}

/// A document submitted for processing
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Caller-assigned position, echoed in the result
    pub index: usize,
    pub data: Vec<u8>,
    pub options: ParseOptions,
}

impl StreamMessage {
    pub fn new(index: usize, data: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            data: data.into(),
            options: ParseOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of one document
#[derive(Debug)]
pub struct ProcessResult {
    pub index: usize,
    pub result: Result<ParseResult>,
    pub duration: Duration,
}

impl ProcessResult {
    /// The document parsed, whether or not it validated
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The document parsed and has no error issues
    pub fn is_valid(&self) -> bool {
        self.result.as_ref().is_ok_and(|r| r.is_valid)
    }

    fn failure(index: usize, error: Error) -> Self {
        Self {
            index,
            result: Err(error),
            duration: Duration::ZERO,
        }
    }
}

/// Statistics for concurrent processing
#[derive(Debug, Default, Clone)]
pub struct StreamStats {
    /// Documents submitted
    pub received: usize,
    /// Documents that parsed
    pub succeeded: usize,
    /// Parsed documents without error issues
    pub valid: usize,
    /// Documents that failed or timed out
    pub failed: usize,
    /// Documents currently being parsed
    pub in_flight: usize,
    /// Highest `in_flight` observed
    pub peak_in_flight: usize,
    /// Processing start time
    pub started_at: Option<Instant>,
}

impl StreamStats {
    /// Get processing rate (documents per second)
    pub fn rate(&self) -> f64 {
        match self.started_at {
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    usize_to_f64(self.succeeded + self.failed) / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Get success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.succeeded + self.failed;
        if total == 0 {
            100.0
        } else {
            usize_to_f64(self.succeeded) / usize_to_f64(total) * 100.0
        }
    }
}

/// Bounded concurrent parser over a shared [`Pipeline`]
#[derive(Debug)]
pub struct StreamProcessor {
    pipeline: Arc<Pipeline>,
    config: StreamConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<Mutex<StreamStats>>,
}

impl StreamProcessor {
    pub fn new(pipeline: Arc<Pipeline>, config: StreamConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            pipeline,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            stats: Arc::new(Mutex::new(StreamStats::default())),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Parse every message; results come back in submission order
    pub async fn process_all(&self, messages: Vec<StreamMessage>) -> Vec<ProcessResult> {
        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let index = message.index;
            let permit = match self.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    handles.push((index, None, Some(e)));
                    continue;
                }
            };
            let task = tokio::spawn(run(
                Arc::clone(&self.pipeline),
                Arc::clone(&self.stats),
                self.config.message_timeout,
                message,
                permit,
            ));
            handles.push((index, Some(task), None));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, task, error) in handles {
            let result = match (task, error) {
                (Some(task), _) => match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        self.count_failure().await;
                        ProcessResult::failure(index, Error::Streaming(format!("task failed: {e}")))
                    }
                },
                (None, Some(e)) => ProcessResult::failure(index, e),
                (None, None) => ProcessResult::failure(index, Error::Streaming("not scheduled".to_string())),
            };
            results.push(result);
        }
        results
    }

    /// Parse a single message on the pool
    pub async fn process(&self, message: StreamMessage) -> ProcessResult {
        let index = message.index;
        match self.acquire().await {
            Ok(permit) => {
                run(
                    Arc::clone(&self.pipeline),
                    Arc::clone(&self.stats),
                    self.config.message_timeout,
                    message,
                    permit,
                )
                .await
            }
            Err(e) => ProcessResult::failure(index, e),
        }
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| Error::Streaming(format!("Semaphore error: {e}")))?;
        let mut stats = self.stats.lock().await;
        stats.received += 1;
        if stats.started_at.is_none() {
            stats.started_at = Some(Instant::now());
        }
        Ok(permit)
    }

    async fn count_failure(&self) {
        let mut stats = self.stats.lock().await;
        stats.failed += 1;
    }

    /// Get current statistics
    pub async fn stats(&self) -> StreamStats {
        self.stats.lock().await.clone()
    }

    /// Clear the statistics
    pub async fn reset(&self) {
        *self.stats.lock().await = StreamStats::default();
    }
}

async fn run(
    pipeline: Arc<Pipeline>,
    stats: Arc<Mutex<StreamStats>>,
    timeout: Duration,
    message: StreamMessage,
    permit: OwnedSemaphorePermit,
) -> ProcessResult {
    let _permit = permit;
    let index = message.index;
    {
        let mut stats = stats.lock().await;
        stats.in_flight += 1;
        stats.peak_in_flight = stats.peak_in_flight.max(stats.in_flight);
    }

    let started = Instant::now();
    let job = tokio::task::spawn_blocking(move || pipeline.parse(&message.data, &message.options));
    let result = match tokio::time::timeout(timeout, job).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(Error::Streaming(format!("parse task failed: {e}"))),
        Err(_) => {
            warn!(index, ?timeout, "document timed out");
            Err(Error::Streaming(format!("document {index} timed out")))
        }
    };
    let duration = started.elapsed();

    let mut stats = stats.lock().await;
    stats.in_flight -= 1;
    match &result {
        Ok(parsed) => {
            stats.succeeded += 1;
            if parsed.is_valid {
                stats.valid += 1;
            }
        }
        Err(_) => stats.failed += 1,
    }
    debug!(index, ok = result.is_ok(), ?duration, "document processed");

    ProcessResult {
        index,
        result,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tender(control: &str, consignee: bool) -> String {
        let mut body = vec!["B2**TEST**SHIP123**PP", "N1*SH*ACME"];
        if consignee {
            body.push("N1*CN*BETA");
        }
        body.extend(["S5*1*CL", "S5*2*CU"]);
        let mut text = String::from(
            "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*240101*1200*U*00401*000000001*0*P*>~GS*SM*SENDER*RECEIVER*20240101*1200*1*X*004010~",
        );
        text.push_str(&format!("ST*204*{control}~"));
        for seg in &body {
            text.push_str(seg);
            text.push('~');
        }
        text.push_str(&format!("SE*{}*{control}~GE*1*1~IEA*1*000000001~", body.len() + 2));
        text
    }

    fn processor(max_concurrency: usize) -> StreamProcessor {
        let pipeline = Arc::new(Pipeline::with_defaults().unwrap());
        StreamProcessor::new(
            pipeline,
            StreamConfig {
                max_concurrency,
                ..StreamConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let processor = processor(2);
        let messages = vec![
            StreamMessage::new(0, tender("0001", true)),
            StreamMessage::new(1, "HELLO"),
            StreamMessage::new(2, tender("0002", false)),
            StreamMessage::new(3, tender("0003", true)),
        ];

        let results = processor.process_all(messages).await;
        let indexes: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indexes, [0, 1, 2, 3]);

        assert!(results[0].is_valid());
        assert!(!results[1].is_success());
        assert!(results[1].result.as_ref().unwrap_err().is_fatal());
        assert!(results[2].is_success());
        assert!(!results[2].is_valid());
        assert!(results[3].is_valid());

        let stats = processor.stats().await;
        assert_eq!(stats.received, 4);
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let processor = processor(3);
        let messages: Vec<StreamMessage> = (0..12)
            .map(|i| StreamMessage::new(i, tender(&format!("{:04}", i + 1), true)))
            .collect();

        let results = processor.process_all(messages).await;
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(ProcessResult::is_valid));

        let stats = processor.stats().await;
        assert!(stats.peak_in_flight >= 1);
        assert!(stats.peak_in_flight <= 3);
    }

    #[tokio::test]
    async fn test_single_message_with_options() {
        let processor = processor(1);
        let message = StreamMessage::new(7, tender("0001", true))
            .with_options(ParseOptions::new().with_ack(true));

        let outcome = processor.process(message).await;
        assert_eq!(outcome.index, 7);
        let parsed = outcome.result.unwrap();
        assert!(parsed.ack_edi().unwrap().contains("AK5*A"));

        processor.reset().await;
        assert_eq!(processor.stats().await.received, 0);
    }

    #[test]
    fn test_stats_rates_without_work() {
        let stats = StreamStats::default();
        assert!((stats.rate() - 0.0).abs() < f64::EPSILON);
        assert!((stats.success_rate() - 100.0).abs() < f64::EPSILON);
    }
}
