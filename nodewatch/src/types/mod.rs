//! 型定義

pub mod node;
