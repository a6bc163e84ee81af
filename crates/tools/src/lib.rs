//! rdropout のコマンドラインツール群

pub mod common;
