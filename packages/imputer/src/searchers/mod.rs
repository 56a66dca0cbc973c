//! Reference discovery implementations.

pub mod tavily;

pub use tavily::TavilySearcher;
