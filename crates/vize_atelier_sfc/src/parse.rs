//! SFC block splitting.
//!
//! Byte-level scanning with `memchr` jumps between `<` positions. Only the
//! top level of the document is interpreted: the content of a block is
//! sliced verbatim and handed to the owning compiler later.

use crate::types::*;
use memchr::{memchr, memchr_iter, memmem};

const TAG_TEMPLATE: &[u8] = b"template";

/// Parse a Vue SFC into a descriptor.
pub fn parse_sfc(source: &str, options: SfcParseOptions) -> Result<SfcDescriptor, SfcError> {
    let mut descriptor = SfcDescriptor::new(options.filename, source);
    let mut scanner = Scanner::new(source);

    while let Some(block) = scanner.next_block()? {
        let loc = scanner.location(block.content_start, block.content_end);
        let content = source[block.content_start..block.content_end].to_string();
        let RawBlock { tag, mut attrs, .. } = block;
        let lang = attrs.get("lang").cloned();
        let src = attrs.get("src").cloned();

        if options.ignore_empty
            && src.is_none()
            && content.trim().is_empty()
            && !tag.eq_ignore_ascii_case("template")
        {
            continue;
        }

        if tag.eq_ignore_ascii_case("template") {
            if descriptor.template.is_some() {
                return Err(SfcError::new(
                    "SFC can only contain one <template> block",
                    "DUPLICATE_TEMPLATE",
                    loc,
                ));
            }
            descriptor.template = Some(SfcTemplateBlock {
                content,
                loc,
                lang,
                src,
                attrs,
            });
        } else if tag.eq_ignore_ascii_case("script") {
            let setup = attrs.contains_key("setup");
            let (slot, code, kind) = if setup {
                (&mut descriptor.script_setup, "DUPLICATE_SCRIPT_SETUP", "<script setup>")
            } else {
                (&mut descriptor.script, "DUPLICATE_SCRIPT", "<script>")
            };
            if slot.is_some() {
                return Err(SfcError::new(
                    format!("SFC can only contain one {kind} block"),
                    code,
                    loc,
                ));
            }
            *slot = Some(SfcScriptBlock {
                content,
                loc,
                lang,
                src,
                setup,
                attrs,
            });
        } else if tag.eq_ignore_ascii_case("style") {
            let scoped = attrs.contains_key("scoped");
            let module = attrs.remove("module").map(|name| {
                if name.is_empty() {
                    String::from("$style")
                } else {
                    name
                }
            });
            descriptor.styles.push(SfcStyleBlock {
                content,
                loc,
                lang,
                src,
                scoped,
                module,
                attrs,
            });
        } else {
            descriptor.custom_blocks.push(SfcCustomBlock {
                block_type: tag.to_string(),
                content,
                loc,
                attrs,
            });
        }
    }

    Ok(descriptor)
}

/// A top-level block as found by the scanner.
struct RawBlock<'s> {
    tag: &'s str,
    attrs: BlockAttrs,
    content_start: usize,
    content_end: usize,
}

struct Scanner<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Advance to the next top-level block, skipping text and comments.
    fn next_block(&mut self) -> Result<Option<RawBlock<'s>>, SfcError> {
        loop {
            let Some(offset) = memchr(b'<', &self.bytes[self.pos..]) else {
                self.pos = self.bytes.len();
                return Ok(None);
            };
            self.pos += offset;

            if self.bytes[self.pos..].starts_with(b"<!--") {
                self.pos = match memmem::find(&self.bytes[self.pos..], b"-->") {
                    Some(end) => self.pos + end + 3,
                    None => self.bytes.len(),
                };
                continue;
            }

            let start = self.pos;
            let Some((tag, attrs, self_closing)) = self.open_tag() else {
                self.pos = start + 1;
                continue;
            };

            if self_closing {
                return Ok(Some(RawBlock {
                    tag,
                    attrs,
                    content_start: self.pos,
                    content_end: self.pos,
                }));
            }

            let content_start = self.pos;
            let Some((content_end, end)) = self.close_tag(tag.as_bytes(), content_start) else {
                return Err(SfcError::new(
                    format!("Element <{tag}> is missing end tag."),
                    "MISSING_END_TAG",
                    self.location(start, start),
                ));
            };
            self.pos = end;

            return Ok(Some(RawBlock {
                tag,
                attrs,
                content_start,
                content_end,
            }));
        }
    }

    /// Parse `<name attr=...>` at `self.pos`.
    ///
    /// Leaves `self.pos` right after the closing `>`.
    fn open_tag(&mut self) -> Option<(&'s str, BlockAttrs, bool)> {
        let bytes = self.bytes;
        let len = bytes.len();
        let mut pos = self.pos + 1;

        let name_start = pos;
        while pos < len && is_tag_name_char(bytes[pos]) {
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let tag = &self.source[name_start..pos];

        let mut attrs = BlockAttrs::default();
        loop {
            while pos < len && is_whitespace(bytes[pos]) {
                pos += 1;
            }
            if pos >= len {
                return None;
            }
            match bytes[pos] {
                b'>' => {
                    self.pos = pos + 1;
                    return Some((tag, attrs, false));
                }
                b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                    self.pos = pos + 2;
                    return Some((tag, attrs, true));
                }
                b'/' => {
                    pos += 1;
                    continue;
                }
                _ => {}
            }

            let name_start = pos;
            while pos < len && !matches!(bytes[pos], b'=' | b'>' | b'/') && !is_whitespace(bytes[pos]) {
                pos += 1;
            }
            let name = &self.source[name_start..pos];

            while pos < len && matches!(bytes[pos], b' ' | b'\t') {
                pos += 1;
            }

            let value = if bytes.get(pos) == Some(&b'=') {
                pos += 1;
                while pos < len && matches!(bytes[pos], b' ' | b'\t') {
                    pos += 1;
                }
                match bytes.get(pos) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let value_start = pos + 1;
                        let value_end = memchr(quote, &bytes[value_start..])
                            .map_or(len, |i| value_start + i);
                        pos = (value_end + 1).min(len);
                        &self.source[value_start..value_end]
                    }
                    _ => {
                        let value_start = pos;
                        while pos < len && !matches!(bytes[pos], b'>' | b'/') && !is_whitespace(bytes[pos]) {
                            pos += 1;
                        }
                        &self.source[value_start..pos]
                    }
                }
            } else {
                ""
            };

            if !name.is_empty() {
                attrs.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Find the closing tag of `tag`, returning (content end, position after `>`).
    fn close_tag(&self, tag: &[u8], from: usize) -> Option<(usize, usize)> {
        let bytes = self.bytes;
        let nests = tag.eq_ignore_ascii_case(TAG_TEMPLATE);
        let mut depth = 1usize;
        let mut pos = from;

        while let Some(offset) = memchr(b'<', &bytes[pos..]) {
            pos += offset;
            let rest = &bytes[pos..];

            if rest.get(1) == Some(&b'/') && starts_with_ci(&rest[2..], tag) {
                let after = pos + 2 + tag.len();
                let mut end = after;
                while end < bytes.len() && is_whitespace(bytes[end]) {
                    end += 1;
                }
                if bytes.get(end) == Some(&b'>') {
                    depth -= 1;
                    if depth == 0 {
                        return Some((pos, end + 1));
                    }
                }
            } else if nests && starts_with_ci(&rest[1..], tag) {
                let after = pos + 1 + tag.len();
                if bytes.get(after).is_some_and(|b| *b == b'>' || is_whitespace(*b)) {
                    let closing = memchr(b'>', &bytes[after..]).map(|i| after + i);
                    let self_closing = closing.is_some_and(|i| bytes[i - 1] == b'/');
                    if !self_closing {
                        depth += 1;
                    }
                }
            }
            pos += 1;
        }

        None
    }

    /// Convert a content range into a 1-based line/column location.
    fn location(&self, start: usize, end: usize) -> BlockLocation {
        let (start_line, start_column) = line_column(self.bytes, start);
        let (end_line, end_column) = line_column(self.bytes, end);
        BlockLocation {
            start,
            end,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

fn line_column(bytes: &[u8], offset: usize) -> (usize, usize) {
    let head = &bytes[..offset];
    let line = memchr_iter(b'\n', head).count() + 1;
    let column = match memchr::memrchr(b'\n', head) {
        Some(nl) => offset - nl,
        None => offset + 1,
    };
    (line, column)
}

#[inline(always)]
fn starts_with_ci(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[inline(always)]
fn is_tag_name_char(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_')
}

#[inline(always)]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}
