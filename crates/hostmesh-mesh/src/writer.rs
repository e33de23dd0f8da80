// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Indented nginx block writer.

const INDENT: &str = "    ";

/// Accumulates nginx configuration with block-aware indentation.
#[derive(Debug, Default)]
pub(crate) struct BlockWriter {
    buf: String,
    depth: usize,
}

impl BlockWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Write one indented line.
    pub(crate) fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
        self
    }

    /// Write a directive terminated by `;`.
    pub(crate) fn directive(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.line(format!("{};", text.as_ref()))
    }

    /// Open `header {`.
    pub(crate) fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
        self
    }

    /// Close the innermost block.
    pub(crate) fn close(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line("}")
    }

    pub(crate) fn blank(&mut self) -> &mut Self {
        self.buf.push('\n');
        self
    }

    /// Insert pre-formatted text, re-indented to the current depth.
    pub(crate) fn raw(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            if line.trim().is_empty() {
                self.blank();
            } else {
                self.line(line.trim_end());
            }
        }
        self
    }

    pub(crate) fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut w = BlockWriter::new();
        w.open("server").directive("listen 80");
        w.open("location /").directive("return 200");
        w.close().close();
        assert_eq!(
            w.finish(),
            "server {\n    listen 80;\n    location / {\n        return 200;\n    }\n}\n"
        );
    }
}
