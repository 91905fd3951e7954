/// Fixed-capacity stack used for the value spill stack and the return
/// stack. Capacity is set at construction; overflow is an error, never a
/// reallocation.
pub struct Stack<T: Copy> {
    items: Vec<T>,
    cap: usize,
}

#[derive(Debug, PartialEq)]
pub enum StackError {
    StackEmpty,
    StackFull,
    OverwriteInvalid,
}

impl<T: Copy> Stack<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: Vec::with_capacity(cap),
            cap,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), StackError> {
        if self.items.len() == self.cap {
            return Err(StackError::StackFull);
        }
        self.items.push(item);
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        self.items.pop().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.items.last().copied()
    }

    #[inline]
    pub fn try_peek(&self) -> Result<T, StackError> {
        self.peek().ok_or(StackError::StackEmpty)
    }

    /// The item `n` below the top; `peek_back_n(0)` is the top.
    #[inline]
    pub fn peek_back_n(&self, n: usize) -> Option<T> {
        let len = self.items.len();
        len.checked_sub(n + 1).map(|i| self.items[i])
    }

    #[inline]
    pub fn try_peek_back_n(&self, n: usize) -> Result<T, StackError> {
        self.peek_back_n(n).ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn try_peek_back_n_mut(&mut self, n: usize) -> Result<&mut T, StackError> {
        let len = self.items.len();
        match len.checked_sub(n + 1) {
            Some(i) => Ok(&mut self.items[i]),
            None => Err(StackError::StackEmpty),
        }
    }

    #[inline]
    pub fn overwrite_back_n(&mut self, n: usize, item: T) -> Result<(), StackError> {
        match self.try_peek_back_n_mut(n) {
            Ok(slot) => {
                *slot = item;
                Ok(())
            }
            Err(_) => Err(StackError::OverwriteInvalid),
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bottom-to-top iteration, for stack dumps.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }
}

#[cfg(test)]
pub mod test {
    use super::{Stack, StackError};

    #[test]
    fn stack() {
        const ITEMS: usize = 16;
        let mut stack = Stack::<i32>::new(ITEMS);

        for _ in 0..3 {
            for i in 0..(ITEMS as i32) {
                assert!(stack.push(i).is_ok());
            }
            assert_eq!(stack.push(100), Err(StackError::StackFull));
            for i in (0..(ITEMS as i32)).rev() {
                assert_eq!(stack.pop().unwrap(), i);
            }
            assert!(stack.pop().is_none());
        }
    }

    #[test]
    fn back_n() {
        let mut stack = Stack::<i32>::new(8);
        for i in 0..4 {
            stack.push(i).unwrap();
        }
        assert_eq!(stack.peek_back_n(0), Some(3));
        assert_eq!(stack.peek_back_n(3), Some(0));
        assert_eq!(stack.peek_back_n(4), None);
        stack.overwrite_back_n(1, 99).unwrap();
        assert_eq!(stack.peek_back_n(1), Some(99));
    }
}
