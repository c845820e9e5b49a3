//! 共通型定義

pub mod error;
