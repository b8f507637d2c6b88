//! Collaborator seams for the chunk loop: reader, processor, writer.
//!
//! The engine owns the loop and the fault-tolerance decisions; these
//! traits are implemented by the surrounding application for its
//! concrete record types.

use chunkflow_types::{ExecutionContext, ItemError};

/// Outcome of processing a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed<O> {
    /// Transformed item destined for the sink.
    Emit(O),
    /// Deliberately excluded from output. Not a skip and not a
    /// failure; tracked in the filter counter only.
    Filtered,
    /// Data-validity failure: the item is still written, tagged failed
    /// by the processor, and the reason lands in the step's failure
    /// list. Distinct from a skip, which removes the item entirely.
    EmitFailed { item: O, reason: String },
}

/// Sequential input source producing items one at a time.
///
/// `read` signals end-of-input with `Ok(None)` and must never error on
/// normal exhaustion. A malformed record is the processor's problem,
/// not the reader's: surface the raw record and let the processing
/// stage classify it.
pub trait ItemReader<I>: Send {
    /// Called once before the first `read`, with the step's restored
    /// execution context. Readers that support restart use it to skip
    /// already-committed input.
    fn open(&mut self, _context: &ExecutionContext) -> Result<(), ItemError> {
        Ok(())
    }

    /// Pull the next item, or `None` once exhausted.
    fn read(&mut self) -> Result<Option<I>, ItemError>;

    /// Called before each chunk commit is persisted; readers record
    /// their restart position here.
    fn update(&self, _context: &mut ExecutionContext) {}
}

/// Transform applied to every read item.
pub trait ItemProcessor<I, O>: Send + Sync {
    fn process(&self, item: &I) -> Result<Processed<O>, ItemError>;
}

/// Batch sink with all-or-nothing acceptance.
///
/// A returned error means the whole batch was rejected; the engine
/// retries the chunk as a unit before escalating.
pub trait ItemWriter<O>: Send + Sync {
    fn write(&self, items: &[O]) -> Result<(), ItemError>;
}

impl<I, O, F> ItemProcessor<I, O> for F
where
    F: Fn(&I) -> Result<Processed<O>, ItemError> + Send + Sync,
{
    fn process(&self, item: &I) -> Result<Processed<O>, ItemError> {
        self(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountdownReader {
        remaining: u32,
    }

    impl ItemReader<u32> for CountdownReader {
        fn read(&mut self) -> Result<Option<u32>, ItemError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(self.remaining))
        }
    }

    #[test]
    fn reader_signals_exhaustion_with_none() {
        let mut reader = CountdownReader { remaining: 2 };
        assert_eq!(reader.read().unwrap(), Some(1));
        assert_eq!(reader.read().unwrap(), Some(0));
        assert_eq!(reader.read().unwrap(), None);
        // Reading past exhaustion stays None, never errors.
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn closures_are_processors() {
        let double = |item: &u32| Ok(Processed::Emit(item * 2));
        assert_eq!(double.process(&21).unwrap(), Processed::Emit(42));
    }

    #[test]
    fn filtered_and_emit_failed_are_distinct() {
        let classify = |item: &u32| {
            if *item == 0 {
                Ok(Processed::Filtered)
            } else if *item % 2 == 1 {
                Ok(Processed::EmitFailed {
                    item: *item,
                    reason: "odd".to_string(),
                })
            } else {
                Ok(Processed::Emit(*item))
            }
        };
        assert_eq!(classify.process(&0).unwrap(), Processed::Filtered);
        assert!(matches!(
            classify.process(&3).unwrap(),
            Processed::EmitFailed { .. }
        ));
        assert_eq!(classify.process(&4).unwrap(), Processed::Emit(4));
    }
}
