//! Page arena and the array allocator built on it.
//!
//! [`PageArena`] carves spans out of fixed-size pages so that many short-lived
//! small arrays cost a handful of heap allocations. Requests larger than a page
//! get a dedicated page. Pages are accounted against a [`ByteBudget`] and freed
//! all at once when the arena is cleared or dropped.

use std::mem::size_of;

use fsbroker_core::budget::MemoryBudget;

use crate::error::{Error, Result};
use crate::guard::{ByteBudget, ByteGuard};

pub const DEFAULT_PAGE_LEN: usize = 8192;

struct Page<T> {
    data: Vec<T>,
    used: usize,
    _guard: ByteGuard,
}

/// Location of an allocation inside a [`PageArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSpan {
    generation: u64,
    page: usize,
    offset: usize,
    len: usize,
}

impl ArenaSpan {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct PageArena<T = u8> {
    page_len: usize,
    budget: ByteBudget,
    pages: Vec<Page<T>>,
    // index of the page small allocations are bumped from
    current: Option<usize>,
    generation: u64,
}

impl<T: Clone + Default> PageArena<T> {
    pub fn new(budget: ByteBudget) -> Self {
        Self::with_page_len(budget, DEFAULT_PAGE_LEN)
    }

    pub fn with_page_len(budget: ByteBudget, page_len: usize) -> Self {
        Self {
            page_len: page_len.max(1),
            budget,
            pages: Vec::new(),
            current: None,
            generation: 0,
        }
    }

    /// Reserve `n` elements, default-initialized.
    pub fn alloc(&mut self, n: usize) -> Result<ArenaSpan> {
        if let Some(idx) = self.current {
            let page = &mut self.pages[idx];
            if page.data.len() - page.used >= n {
                let offset = page.used;
                page.used += n;
                return Ok(self.span(idx, offset, n));
            }
        }

        if n > self.page_len {
            let idx = self.push_page(n)?;
            self.pages[idx].used = n;
            return Ok(self.span(idx, 0, n));
        }

        let idx = self.push_page(self.page_len)?;
        self.pages[idx].used = n;
        self.current = Some(idx);
        Ok(self.span(idx, 0, n))
    }

    fn push_page(&mut self, len: usize) -> Result<usize> {
        let bytes = len.saturating_mul(size_of::<T>().max(1));
        let guard = self
            .budget
            .try_acquire(bytes, "arena-page")
            .ok_or_else(|| Error::BudgetExceeded {
                tag: "arena-page",
                requested: bytes,
                capacity: self.budget.capacity_bytes(),
                used: self.budget.used_bytes(),
            })?;
        self.pages.push(Page {
            data: vec![T::default(); len],
            used: 0,
            _guard: guard,
        });
        Ok(self.pages.len() - 1)
    }

    fn span(&self, page: usize, offset: usize, len: usize) -> ArenaSpan {
        ArenaSpan {
            generation: self.generation,
            page,
            offset,
            len,
        }
    }

    fn check(&self, span: &ArenaSpan) -> Result<()> {
        if span.generation != self.generation || span.page >= self.pages.len() {
            return Err(Error::ForeignSpan(format!("{span:?}")));
        }
        Ok(())
    }

    pub fn get(&self, span: &ArenaSpan) -> Result<&[T]> {
        self.check(span)?;
        Ok(&self.pages[span.page].data[span.offset..span.offset + span.len])
    }

    pub fn get_mut(&mut self, span: &ArenaSpan) -> Result<&mut [T]> {
        self.check(span)?;
        Ok(&mut self.pages[span.page].data[span.offset..span.offset + span.len])
    }

    /// Release every page. Spans handed out earlier stop resolving.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.current = None;
        self.generation += 1;
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Elements handed out across all pages.
    pub fn used(&self) -> usize {
        self.pages.iter().map(|p| p.used).sum()
    }
}

/// Where an [`ArenaAllocator`] placed an array.
#[derive(Debug)]
pub enum Allocation<T> {
    Arena(ArenaSpan),
    Heap(Vec<T>),
}

impl<T> Allocation<T> {
    pub fn len(&self) -> usize {
        match self {
            Allocation::Arena(span) => span.len(),
            Allocation::Heap(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Array allocator over an optional [`PageArena`]; without an arena it falls
/// back to the global heap.
pub struct ArenaAllocator<'a, T> {
    arena: Option<&'a mut PageArena<T>>,
}

impl<'a, T: Clone + Default> ArenaAllocator<'a, T> {
    pub fn heap() -> Self {
        Self { arena: None }
    }

    pub fn with_arena(arena: &'a mut PageArena<T>) -> Self {
        Self { arena: Some(arena) }
    }

    /// Largest element count a single allocation may request.
    pub fn max_size(&self) -> usize {
        isize::MAX as usize / size_of::<T>().max(1)
    }

    pub fn allocate(&mut self, n: usize) -> Result<Allocation<T>> {
        let max = self.max_size();
        if n > max {
            return Err(Error::TooLarge { requested: n, max });
        }
        match self.arena.as_deref_mut() {
            Some(arena) => arena.alloc(n).map(Allocation::Arena),
            None => Ok(Allocation::Heap(vec![T::default(); n])),
        }
    }

    pub fn slice<'s>(&'s self, alloc: &'s Allocation<T>) -> Result<&'s [T]> {
        match (alloc, self.arena.as_deref()) {
            (Allocation::Heap(v), _) => Ok(v),
            (Allocation::Arena(span), Some(arena)) => arena.get(span),
            (Allocation::Arena(span), None) => Err(Error::ForeignSpan(format!("{span:?}"))),
        }
    }

    pub fn slice_mut<'s>(&'s mut self, alloc: &'s mut Allocation<T>) -> Result<&'s mut [T]> {
        match (alloc, self.arena.as_deref_mut()) {
            (Allocation::Heap(v), _) => Ok(v),
            (Allocation::Arena(span), Some(arena)) => arena.get_mut(span),
            (Allocation::Arena(span), None) => Err(Error::ForeignSpan(format!("{span:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_allocations_share_a_page() {
        let budget = ByteBudget::new(1 << 20);
        let mut arena: PageArena<u8> = PageArena::with_page_len(budget.clone(), 64);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(20).unwrap();
        assert_eq!(arena.page_count(), 1);
        assert_eq!(budget.used_bytes(), 64);

        arena.get_mut(&a).unwrap().fill(1);
        arena.get_mut(&b).unwrap().fill(2);
        assert!(arena.get(&a).unwrap().iter().all(|&x| x == 1));
        assert!(arena.get(&b).unwrap().iter().all(|&x| x == 2));

        // does not fit in the remaining 34 bytes
        let _c = arena.alloc(40).unwrap();
        assert_eq!(arena.page_count(), 2);
    }

    #[test]
    fn oversized_request_gets_dedicated_page() {
        let budget = ByteBudget::new(1 << 20);
        let mut arena: PageArena<u32> = PageArena::with_page_len(budget.clone(), 16);
        let small = arena.alloc(4).unwrap();
        let big = arena.alloc(100).unwrap();
        assert_eq!(arena.page_count(), 2);
        assert_eq!(big.len(), 100);
        assert_eq!(budget.used_bytes(), (16 + 100) * 4);

        // small allocations keep bumping the first page
        let next = arena.alloc(4).unwrap();
        assert_eq!(arena.page_count(), 2);
        assert_ne!(small, next);

        arena.clear();
        assert_eq!(budget.used_bytes(), 0);
        assert!(arena.get(&small).is_err());
    }

    #[test]
    fn arena_pages_respect_budget() {
        let budget = ByteBudget::new(100);
        let mut arena: PageArena<u8> = PageArena::with_page_len(budget, 64);
        arena.alloc(8).unwrap();
        let err = arena.alloc(60).unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded { requested: 64, .. }));
    }

    #[test]
    fn allocator_rejects_oversized_arrays_before_allocating() {
        let budget = ByteBudget::new(1 << 20);
        let mut arena: PageArena<u64> = PageArena::new(budget.clone());
        let mut alloc = ArenaAllocator::with_arena(&mut arena);
        let max = alloc.max_size();
        let err = alloc.allocate(max + 1).unwrap_err();
        assert_eq!(err, Error::TooLarge { requested: max + 1, max });
        assert_eq!(budget.used_bytes(), 0);

        let core: fsbroker_core::error::Error = err.into();
        assert_eq!(
            core.code(),
            fsbroker_core::error::ErrorCode::BadMemoryAllocation
        );
    }

    #[test]
    fn allocator_uses_arena_or_heap() {
        let mut arena: PageArena<i32> = PageArena::with_page_len(ByteBudget::unbounded(), 32);
        {
            let mut alloc = ArenaAllocator::with_arena(&mut arena);
            let mut a = alloc.allocate(5).unwrap();
            assert!(matches!(a, Allocation::Arena(_)));
            alloc.slice_mut(&mut a).unwrap().copy_from_slice(&[1, 2, 3, 4, 5]);
            assert_eq!(alloc.slice(&a).unwrap(), &[1, 2, 3, 4, 5]);
        }
        assert_eq!(arena.used(), 5);

        let mut heap = ArenaAllocator::<i32>::heap();
        let h = heap.allocate(3).unwrap();
        assert!(matches!(h, Allocation::Heap(_)));
        assert_eq!(heap.slice(&h).unwrap(), &[0, 0, 0]);
    }
}
