use crate::error::ConfigError;
use crate::nodes::BatchBuffer;
use proptest::prelude::*;

#[test]
fn test_batches_of_two_from_five() {
  let mut buffer = BatchBuffer::new(2).expect("buffer");
  let mut batches = Vec::new();
  for n in 1..=5 {
    if let Some(batch) = buffer.push(n) {
      batches.push(batch);
    }
  }
  assert_eq!(buffer.len(), 1);
  batches.extend(buffer.flush());
  assert!(buffer.is_empty());
  assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[test]
fn test_flush_of_empty_buffer_is_none() {
  let mut buffer = BatchBuffer::<u8>::new(3).expect("buffer");
  assert_eq!(buffer.flush(), None);
  assert_eq!(buffer.size(), 3);
}

#[test]
fn test_zero_size_rejected() {
  assert_eq!(
    BatchBuffer::<u8>::new(0).unwrap_err(),
    ConfigError::InvalidBatchSize { size: 0 }
  );
}

proptest! {
  #[test]
  fn test_batches_match_chunks(items in prop::collection::vec(any::<i16>(), 0..64), size in 1usize..10) {
    let mut buffer = BatchBuffer::new(size).expect("buffer");
    let mut batches: Vec<Vec<i16>> = items.iter().filter_map(|item| buffer.push(*item)).collect();
    batches.extend(buffer.flush());
    let expected: Vec<Vec<i16>> = items.chunks(size).map(<[i16]>::to_vec).collect();
    prop_assert_eq!(batches, expected);
  }
}
