/// Two live instances of some state and a flag naming the current one. The front holds
/// the last accepted state, the back is scratch for the next candidate.
#[derive(Debug)]
pub struct DoubleBuffer<T> {
    buffers: [T; 2],
    front: usize,
}

impl<T> DoubleBuffer<T> {
    pub fn new(front: T, back: T) -> Self {
        Self { buffers: [front, back], front: 0 }
    }

    pub fn front(&self) -> &T {
        &self.buffers[self.front]
    }

    pub fn front_mut(&mut self) -> &mut T {
        &mut self.buffers[self.front]
    }

    pub fn back(&self) -> &T {
        &self.buffers[1 - self.front]
    }

    pub fn back_mut(&mut self) -> &mut T {
        &mut self.buffers[1 - self.front]
    }

    /// The front for reading alongside the back for writing.
    pub fn split_mut(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.buffers;
        if self.front == 0 { (&*a, b) } else { (&*b, a) }
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    pub fn into_front(self) -> T {
        let [a, b] = self.buffers;
        if self.front == 0 { a } else { b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap() {
        let mut buffers = DoubleBuffer::new(1, 2);
        assert_eq!((*buffers.front(), *buffers.back()), (1, 2));

        *buffers.back_mut() = 3;
        buffers.swap();
        assert_eq!((*buffers.front(), *buffers.back()), (3, 1));

        let (front, back) = buffers.split_mut();
        *back = *front + 1;
        assert_eq!(*buffers.back(), 4);
        assert_eq!(buffers.into_front(), 3);
    }
}
