use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn first(size: u32) -> Self {
        Self::new(1, size)
    }

    /// Clamps the request to `max_size` and returns `(limit, offset)`.
    /// Pages below 1 are treated as page 1.
    pub fn window(&self, max_size: u32) -> Result<Window> {
        if self.size == 0 {
            return Err(AppError::Validation("page size must be positive".to_string()));
        }
        let page = self.page.max(1);
        let size = self.size.min(max_size.max(1));
        Ok(Window {
            page,
            size,
            limit: i64::from(size),
            offset: i64::from(page - 1) * i64::from(size),
        })
    }
}

/// Normalized page bounds ready for `LIMIT ? OFFSET ?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub page: u32,
    pub size: u32,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    /// `items.len() == size`; approximate under concurrent writes.
    pub more: bool,
}

impl<T> Page<T> {
    pub fn from_window(items: Vec<T>, window: Window) -> Self {
        let more = items.len() == window.size as usize;
        Self {
            items,
            page: window.page,
            size: window.size,
            more,
        }
    }

    pub fn empty(window: Window) -> Self {
        Self {
            items: Vec::new(),
            page: window.page,
            size: window.size,
            more: false,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            more: self.more,
        }
    }
}
