//! Chunked buffer writes
//!
//! Bulk data is split into payloads the service accepts and written one
//! round trip at a time, in order. The first failing chunk aborts the
//! transfer; chunks already written stay written.

use crate::error::{DriverError, Result, ServiceError};
use crate::service::{Batch, RemoteService};
use tracing::{debug, trace};

/// Write `data` into `buffer` starting at byte `offset`; returns the number of
/// chunks issued
pub fn write_chunked<S: RemoteService + ?Sized>(
    service: &mut S,
    buffer: &str,
    offset: u64,
    data: &[u8],
    chunk_size: usize,
) -> Result<usize> {
    if !service.is_up() {
        return Err(ServiceError::NotUp.into());
    }
    let max = service.max_payload();
    if chunk_size == 0 || chunk_size > max {
        return Err(DriverError::Configuration(format!(
            "chunk size {} outside 1..={}",
            chunk_size, max
        )));
    }

    let mut chunks = 0;
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        let chunk_offset = offset + (index * chunk_size) as u64;
        trace!(buffer, chunk = index, offset = chunk_offset, len = chunk.len(), "buffer write");

        let mut batch = Batch::new();
        batch.buffer_write(buffer, chunk_offset, chunk.to_vec());
        service
            .execute(&batch)
            .map_err(|source| DriverError::Transfer {
                buffer: buffer.to_string(),
                chunk: index,
                offset: chunk_offset,
                source,
            })?;
        chunks += 1;
    }

    debug!(buffer, bytes = data.len(), chunks, "chunked write done");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Primitive, Response};

    /// Records every batch and fails the n-th one
    #[derive(Default)]
    struct Recorder {
        up: bool,
        batches: Vec<Batch>,
        fail_at: Option<usize>,
    }

    impl RemoteService for Recorder {
        fn up(&mut self) -> std::result::Result<(), ServiceError> {
            self.up = true;
            Ok(())
        }

        fn down(&mut self) -> std::result::Result<(), ServiceError> {
            self.up = false;
            Ok(())
        }

        fn is_up(&self) -> bool {
            self.up
        }

        fn max_payload(&self) -> usize {
            16
        }

        fn execute(&mut self, batch: &Batch) -> std::result::Result<Vec<Response>, ServiceError> {
            if self.fail_at == Some(self.batches.len()) {
                return Err(ServiceError::Transport("dropped".to_string()));
            }
            self.batches.push(batch.clone());
            Ok(Vec::new())
        }
    }

    fn up_recorder() -> Recorder {
        Recorder {
            up: true,
            ..Recorder::default()
        }
    }

    #[test]
    fn test_chunks_are_sequential() {
        let mut svc = up_recorder();
        let data: Vec<u8> = (0..40).collect();
        let chunks = write_chunked(&mut svc, "d0", 100, &data, 16).unwrap();
        assert_eq!(chunks, 3);

        let writes: Vec<(u64, usize)> = svc
            .batches
            .iter()
            .map(|b| match &b.primitives()[0] {
                Primitive::BufferWrite { offset, data, .. } => (*offset, data.len()),
                other => panic!("unexpected primitive {:?}", other),
            })
            .collect();
        assert_eq!(writes, vec![(100, 16), (116, 16), (132, 8)]);
    }

    #[test]
    fn test_empty_write_issues_nothing() {
        let mut svc = up_recorder();
        assert_eq!(write_chunked(&mut svc, "d0", 0, &[], 16).unwrap(), 0);
        assert!(svc.batches.is_empty());
    }

    #[test]
    fn test_chunk_size_limits() {
        let mut svc = up_recorder();
        let err = write_chunked(&mut svc, "d0", 0, &[0; 4], 17).unwrap_err();
        assert!(err.is_configuration());
        assert!(write_chunked(&mut svc, "d0", 0, &[0; 4], 0).is_err());
        assert!(svc.batches.is_empty());
    }

    #[test]
    fn test_failure_reports_chunk() {
        let mut svc = Recorder {
            fail_at: Some(2),
            ..up_recorder()
        };
        let err = write_chunked(&mut svc, "b_inst", 0, &[7; 64], 8).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Transfer { chunk: 2, offset: 16, ref buffer, .. } if buffer == "b_inst"
        ));
        // Earlier chunks were issued, later ones never were; the instance stays up
        assert_eq!(svc.batches.len(), 2);
        assert!(svc.up);
    }

    #[test]
    fn test_requires_instance_up() {
        let mut svc = Recorder::default();
        assert!(matches!(
            write_chunked(&mut svc, "d0", 0, &[1], 8),
            Err(DriverError::Service(ServiceError::NotUp))
        ));
    }
}
