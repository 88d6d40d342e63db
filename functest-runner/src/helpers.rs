// Copyright (c) The functest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "were" if `plural` is true, otherwise "was".
    pub fn were_plural_if(plural: bool) -> &'static str {
        if plural { "were" } else { "was" }
    }
}

/// Strips a trailing `.py` from a script name, if present.
pub(crate) fn strip_script_ext(name: &str) -> &str {
    name.strip_suffix(".py").unwrap_or(name)
}

/// Glyphs used to mark test statuses in terminal output.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Glyphs {
    pub(crate) tick: &'static str,
    pub(crate) cross: &'static str,
    pub(crate) circle: &'static str,
}

impl Glyphs {
    pub(crate) const UNICODE: Self = Self {
        tick: "✓ ",
        cross: "✖ ",
        circle: "○ ",
    };

    pub(crate) const ASCII: Self = Self {
        tick: "P ",
        cross: "x ",
        circle: "o ",
    };

    /// Picks glyphs based on whether stdout can render unicode.
    pub(crate) fn detect() -> Self {
        if supports_unicode::on(supports_unicode::Stream::Stdout) {
            Self::UNICODE
        } else {
            Self::ASCII
        }
    }
}
