use crate::virtual_machine::errors::Exception;
use crate::virtual_machine::word::Word;

/// Bounded LIFO of words, addressed by depth from the top (0 = top).
///
/// Storage grows on demand up to `capacity`. Every failing operation leaves
/// the stack unchanged.
#[derive(Clone, Debug)]
pub struct Stack {
    words: Vec<Word>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bottom-to-top view of the stack.
    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    pub fn push(&mut self, word: Word) -> Result<(), Exception> {
        if self.words.len() >= self.capacity {
            return Err(Exception::StackOverflow);
        }
        self.words.push(word);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Word, Exception> {
        self.words.pop().ok_or(Exception::StackUnderflow)
    }

    /// Fails with `StackUnderflow` unless at least `count` words are present.
    pub fn require(&self, count: usize) -> Result<(), Exception> {
        if self.words.len() < count {
            return Err(Exception::StackUnderflow);
        }
        Ok(())
    }

    fn index_of(&self, depth: usize) -> Result<usize, Exception> {
        self.words
            .len()
            .checked_sub(depth)
            .and_then(|n| n.checked_sub(1))
            .ok_or(Exception::StackUnderflow)
    }

    /// Returns the word `depth` positions below the top.
    pub fn peek(&self, depth: usize) -> Result<Word, Exception> {
        Ok(self.words[self.index_of(depth)?])
    }

    pub fn top_mut(&mut self) -> Result<&mut Word, Exception> {
        self.words.last_mut().ok_or(Exception::StackUnderflow)
    }

    /// Pushes a copy of the word `depth` positions below the top.
    pub fn dup(&mut self, depth: usize) -> Result<(), Exception> {
        let word = self.peek(depth)?;
        self.push(word)
    }

    /// Exchanges the top with the word `depth` positions below it.
    pub fn swap(&mut self, depth: usize) -> Result<(), Exception> {
        let other = self.index_of(depth)?;
        let top = self.index_of(0)?;
        self.words.swap(top, other);
        Ok(())
    }

    /// Replaces the top two words `a` (beneath) and `b` (top) with `f(a, b)`.
    ///
    /// If `f` fails both operands stay on the stack.
    pub fn combine(
        &mut self,
        f: impl FnOnce(Word, Word) -> Result<Word, Exception>,
    ) -> Result<(), Exception> {
        self.require(2)?;
        let b = self.peek(0)?;
        let a = self.peek(1)?;
        let result = f(a, b)?;
        self.words.pop();
        *self.top_mut()? = result;
        Ok(())
    }
}
