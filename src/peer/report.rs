//! Orchestrator side of the report channel.

use std::io::Read;

use super::outcome::{read_exact, ChunkOutcome, ReportError};

/// One decoded record and where it belongs in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOutcome {
    pub transaction: usize,
    pub chunk: usize,
    pub outcome: ChunkOutcome,
}

/// Outcomes of one transaction, in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReport {
    pub outcomes: Vec<ChunkOutcome>,
    /// Number of chunks in the script for this transaction.
    pub expected_chunks: usize,
}

impl TransactionReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == self.expected_chunks
    }

    /// Every chunk played and every chunk OK.
    pub fn is_success(&self) -> bool {
        self.is_complete() && self.outcomes.iter().all(ChunkOutcome::is_ok)
    }
}

/// Everything the peer reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Transactions that produced at least one record.
    pub transactions: Vec<TransactionReport>,
    /// The peer stopped on request.
    pub stopped: bool,
}

impl Report {
    pub fn is_success(&self) -> bool {
        !self.stopped && self.transactions.iter().all(TransactionReport::is_success)
    }
}

/// Decodes records in script order.
///
/// The reader knows the script's shape, so each record is attributed to
/// its transaction and chunk without framing on the wire.
#[derive(Debug)]
pub struct ReportReader<R> {
    inner: R,
    shape: Vec<usize>,
    transaction: usize,
    chunk: usize,
    ready: Option<u16>,
    finished: bool,
    stopped: bool,
}

impl<R: Read> ReportReader<R> {
    pub fn new(inner: R, shape: Vec<usize>) -> Self {
        Self {
            inner,
            shape,
            transaction: 0,
            chunk: 0,
            ready: None,
            finished: false,
            stopped: false,
        }
    }

    /// Read the ready preamble and return the peer's local port.
    pub fn read_ready(&mut self) -> Result<u16, ReportError> {
        if let Some(port) = self.ready {
            return Ok(port);
        }
        let mut first = [0u8; 1];
        if self.inner.read(&mut first)? == 0 {
            return Err(ReportError::NotReady);
        }
        let mut second = [0u8; 1];
        read_exact(&mut self.inner, &mut second)?;
        let port = u16::from_be_bytes([first[0], second[0]]);
        self.ready = Some(port);
        Ok(port)
    }

    /// Next record, or `None` once the script is exhausted, the peer
    /// stopped, or the channel closed.
    pub fn next_outcome(&mut self) -> Result<Option<RecordedOutcome>, ReportError> {
        if self.finished {
            return Ok(None);
        }
        if self.ready.is_none() {
            self.read_ready()?;
        }
        self.skip_empty_transactions();
        let Some(outcome) = ChunkOutcome::read_from(&mut self.inner)? else {
            self.finished = true;
            return Ok(None);
        };
        if outcome.is_exit() {
            self.stopped = true;
            self.finished = true;
            return Ok(None);
        }
        if self.transaction >= self.shape.len() {
            // The peer wrote past the end of its script.
            self.finished = true;
            return Ok(None);
        }
        let recorded = RecordedOutcome {
            transaction: self.transaction,
            chunk: self.chunk,
            outcome,
        };
        self.chunk += 1;
        Ok(Some(recorded))
    }

    fn skip_empty_transactions(&mut self) {
        while self.transaction < self.shape.len() && self.chunk >= self.shape[self.transaction] {
            self.transaction += 1;
            self.chunk = 0;
        }
    }

    /// Read every remaining record.
    pub fn read_report(&mut self) -> Result<Report, ReportError> {
        let mut transactions: Vec<TransactionReport> = Vec::new();
        while let Some(recorded) = self.next_outcome()? {
            while transactions.len() <= recorded.transaction {
                let expected_chunks = self.shape[transactions.len()];
                transactions.push(TransactionReport {
                    outcomes: Vec::new(),
                    expected_chunks,
                });
            }
            transactions[recorded.transaction]
                .outcomes
                .push(recorded.outcome);
        }
        Ok(Report {
            transactions,
            stopped: self.stopped,
        })
    }

    /// The peer reported a stop.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::outcome::NOT_SAME;

    fn stream(records: &[ChunkOutcome]) -> Vec<u8> {
        let mut bytes = 4242u16.to_be_bytes().to_vec();
        for r in records {
            r.encode_into(&mut bytes);
        }
        bytes
    }

    #[test]
    fn attributes_records_by_shape() {
        let bytes = stream(&[
            ChunkOutcome::ok(),
            ChunkOutcome::ok(),
            ChunkOutcome::not_same(b"ab".to_vec()),
        ]);
        let mut reader = ReportReader::new(&bytes[..], vec![2, 0, 1]);
        assert_eq!(reader.read_ready().unwrap(), 4242);
        let report = reader.read_report().unwrap();
        assert_eq!(report.transactions.len(), 3);
        assert!(report.transactions[0].is_success());
        assert!(report.transactions[1].is_success());
        assert!(report.transactions[2].outcomes[0].contains(NOT_SAME));
        assert!(!report.is_success());
        assert!(!report.stopped);
    }

    #[test]
    fn exit_record_ends_the_report() {
        let bytes = stream(&[ChunkOutcome::ok(), ChunkOutcome::exit_process()]);
        let mut reader = ReportReader::new(&bytes[..], vec![1, 1]);
        let first = reader.next_outcome().unwrap().unwrap();
        assert_eq!((first.transaction, first.chunk), (0, 0));
        assert!(reader.next_outcome().unwrap().is_none());
        assert!(reader.stopped());
    }

    #[test]
    fn incomplete_transaction_is_not_success() {
        let bytes = stream(&[ChunkOutcome::ok()]);
        let report = ReportReader::new(&bytes[..], vec![2])
            .read_report()
            .unwrap();
        assert!(!report.transactions[0].is_complete());
        assert!(!report.is_success());
    }

    #[test]
    fn empty_channel_is_not_ready() {
        let mut reader = ReportReader::new(&[][..], vec![1]);
        assert!(matches!(reader.read_ready(), Err(ReportError::NotReady)));
    }
}
