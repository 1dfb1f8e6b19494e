//! Query construction: filters, ordering, paging and statement rendering.

pub mod criteria;
pub mod filter;
pub mod page;
