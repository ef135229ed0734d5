use std::collections::VecDeque;

/// Bounded history. The last element is the one added last; once the
/// capacity is reached every push evicts the oldest element.
#[derive(Debug, Clone)]
pub struct FIFO<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> FIFO<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history must hold at least one entry");

        FIFO {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push `elem`, returning the evicted element if the queue was full.
    pub fn push(&mut self, elem: T) -> Option<T> {
        let evicted = if self.data.len() < self.capacity {
            None
        } else {
            self.data.pop_front()
        };

        self.data.push_back(elem);

        evicted
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl<T> std::ops::Index<usize> for FIFO<T> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        &self.data[idx]
    }
}

#[test]
fn test_history_keeps_latest_steps() {
    let mut history = FIFO::<Vec<f64>>::new(3);

    assert!(history.is_empty());
    assert!(history.last().is_none());

    for step in 0..3 {
        assert!(history.push(vec![step as f64; 4]).is_none());
    }
    assert!(history.is_full());

    let evicted = history.push(vec![3.0; 4]);
    assert_eq!(evicted, Some(vec![0.0; 4]));

    let firsts: Vec<f64> = history.iter().map(|v| v[0]).collect();
    assert_eq!(firsts, vec![1.0, 2.0, 3.0]);
    assert_eq!(history[0][0], 1.0);
    assert_eq!(history.last().map(|v| v[0]), Some(3.0));
    assert_eq!(history.capacity(), 3);
}

#[test]
fn test_pop_and_clear() {
    let mut history = FIFO::<usize>::new(2);
    history.push(7);
    history.push(8);

    assert_eq!(history.pop_front(), Some(7));
    assert_eq!(history.len(), 1);
    assert!(!history.is_full());

    history.clear();
    assert!(history.is_empty());
}

#[test]
#[should_panic]
fn test_empty_history_is_rejected() {
    let _ = FIFO::<f64>::new(0);
}
