//! Sequential page queue.

use crate::error::{PlaybackError, Result};
use crate::verse::{ReciterId, VerseRef};

/// Next move of sequential playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStep {
    Play(VerseRef),
    /// End of queue under page repeat; starts the next iteration at index 0.
    RepeatPage(VerseRef),
    /// Nothing left on this page.
    Exhausted,
}

/// Verses of one page, in reading order, with a single cursor.
#[derive(Debug, Clone)]
pub struct PageQueue {
    page: u32,
    reciter: ReciterId,
    verses: Vec<VerseRef>,
    index: usize,
    iteration: u8,
}

impl PageQueue {
    pub fn new(page: u32, reciter: ReciterId, verses: Vec<VerseRef>) -> Result<Self> {
        if verses.is_empty() {
            return Err(PlaybackError::EmptyPage(page));
        }

        Ok(Self {
            page,
            reciter,
            verses,
            index: 0,
            iteration: 0,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn reciter(&self) -> &ReciterId {
        &self.reciter
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn iteration(&self) -> u8 {
        self.iteration
    }

    pub fn current(&self) -> Option<VerseRef> {
        self.verses.get(self.index).copied()
    }

    pub fn position_of(&self, verse: VerseRef) -> Option<usize> {
        self.verses.iter().position(|v| *v == verse)
    }

    /// Moves the cursor to `verse` if it is on this page, else to the start.
    pub fn seek_to(&mut self, verse: Option<VerseRef>) -> VerseRef {
        self.index = verse.and_then(|v| self.position_of(v)).unwrap_or(0);
        self.verses[self.index]
    }

    /// Advances past the current verse.
    ///
    /// With `page_repeat = Some(count)` the queue restarts until it has been
    /// played `count` times in total.
    pub fn advance(&mut self, page_repeat: Option<u8>) -> QueueStep {
        if self.index + 1 < self.verses.len() {
            self.index += 1;
            return QueueStep::Play(self.verses[self.index]);
        }

        match page_repeat {
            Some(count) if self.iteration.saturating_add(1) < count => {
                self.iteration += 1;
                self.index = 0;
                QueueStep::RepeatPage(self.verses[0])
            }
            _ => {
                self.iteration = 0;
                self.index = self.verses.len();
                QueueStep::Exhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(n: u16) -> PageQueue {
        let verses = (1..=n).map(|v| VerseRef::new(2, v)).collect();
        PageQueue::new(2, ReciterId::new("husary"), verses).unwrap()
    }

    #[test]
    fn test_empty_page_is_error() {
        let err = PageQueue::new(9, ReciterId::new("a"), Vec::new()).unwrap_err();
        assert!(matches!(err, PlaybackError::EmptyPage(9)));
    }

    #[test]
    fn test_visits_each_index_once() {
        let mut q = queue(4);
        let mut visited = vec![q.current().unwrap().verse];
        while let QueueStep::Play(v) = q.advance(None) {
            visited.push(v.verse);
        }
        assert_eq!(visited, vec![1, 2, 3, 4]);
        assert_eq!(q.current(), None);
    }

    #[test]
    fn test_page_repeat_restarts() {
        let mut q = queue(2);
        assert_eq!(q.advance(Some(3)), QueueStep::Play(VerseRef::new(2, 2)));
        assert_eq!(q.advance(Some(3)), QueueStep::RepeatPage(VerseRef::new(2, 1)));
        assert_eq!(q.iteration(), 1);
        assert_eq!(q.advance(Some(3)), QueueStep::Play(VerseRef::new(2, 2)));
        assert_eq!(q.advance(Some(3)), QueueStep::RepeatPage(VerseRef::new(2, 1)));
        assert_eq!(q.advance(Some(3)), QueueStep::Play(VerseRef::new(2, 2)));
        assert_eq!(q.advance(Some(3)), QueueStep::Exhausted);
        assert_eq!(q.iteration(), 0);
    }

    #[test]
    fn test_page_repeat_of_one_does_not_restart() {
        let mut q = queue(1);
        assert_eq!(q.advance(Some(1)), QueueStep::Exhausted);
    }

    #[test]
    fn test_seek_resumes_by_identity() {
        let mut q = queue(5);
        assert_eq!(q.seek_to(Some(VerseRef::new(2, 4))), VerseRef::new(2, 4));
        assert_eq!(q.index(), 3);

        assert_eq!(q.seek_to(Some(VerseRef::new(3, 1))), VerseRef::new(2, 1));
        assert_eq!(q.seek_to(None), VerseRef::new(2, 1));
    }
}
