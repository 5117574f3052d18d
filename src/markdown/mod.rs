//! Markdown front end: HTML for previews and a block model for layout.

pub mod layout;

pub use layout::{layout_document, DocumentLayout, LaidOutPage, Row};

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// GitHub-flavoured extensions enabled for every parse.
fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Renders Markdown to an HTML fragment.
pub fn to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, parser_options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Inline formatting of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlineStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
    pub strike: bool,
    pub link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub header: bool,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading { level: u8, runs: Vec<Run> },
    Paragraph(Vec<Run>),
    /// `marker` is empty for continuation paragraphs of the same item.
    ListItem { depth: usize, marker: String, runs: Vec<Run> },
    CodeBlock(String),
    Table(Vec<TableRow>),
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Number of enclosing blockquotes.
    pub quote_depth: usize,
}

/// Parses Markdown into a flat list of blocks.
///
/// Raw HTML is dropped. Images are kept as their alt text in italics.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markdown, parser_options()) {
        builder.handle(event);
    }
    builder.flush();
    builder.blocks
}

#[derive(Default)]
struct Nesting {
    strong: u32,
    emphasis: u32,
    strike: u32,
    link: u32,
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<TableRow>,
    row: Vec<String>,
    cell: String,
    in_head: bool,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    runs: Vec<Run>,
    nesting: Nesting,
    quote_depth: usize,
    /// Next number for ordered lists, `None` for bullets.
    lists: Vec<Option<u64>>,
    pending_marker: Option<String>,
    heading: Option<u8>,
    code: Option<String>,
    table: Option<TableBuilder>,
}

impl BlockBuilder {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(code) = self.code.as_mut() {
                    code.push_str(&text);
                } else if let Some(table) = self.table.as_mut() {
                    table.cell.push_str(&text);
                } else {
                    self.push_text(&text, false);
                }
            }
            Event::Code(text) => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push_str(&text);
                } else {
                    self.push_text(&text, true);
                }
            }
            Event::SoftBreak => self.push_text(" ", false),
            Event::HardBreak => self.push_text("\n", false),
            Event::Rule => {
                self.flush();
                self.push_block(BlockKind::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " }, false)
            }
            Event::FootnoteReference(label) => self.push_text(&format!("[{label}]"), false),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush(),
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(level as u8);
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                if let CodeBlockKind::Fenced(lang) = &kind {
                    tracing::trace!(lang = %lang, "fenced code block");
                }
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(Some(next)) => {
                        let marker = format!("{next}.");
                        *next += 1;
                        marker
                    }
                    _ => "\u{2022}".to_string(),
                };
                self.pending_marker = Some(marker);
            }
            Tag::Table(_) => {
                self.flush();
                self.table = Some(TableBuilder::default());
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            Tag::Emphasis | Tag::Image { .. } => self.nesting.emphasis += 1,
            Tag::Strong => self.nesting.strong += 1,
            Tag::Strikethrough => self.nesting.strike += 1,
            Tag::Link { .. } => self.nesting.link += 1,
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.flush(),
            TagEnd::Heading(_) => {
                let runs = std::mem::take(&mut self.runs);
                let level = self.heading.take().unwrap_or(1);
                self.push_block(BlockKind::Heading { level, runs });
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                if let Some(mut code) = self.code.take() {
                    if code.ends_with('\n') {
                        code.pop();
                    }
                    self.push_block(BlockKind::CodeBlock(code));
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Item => {
                self.flush();
                self.pending_marker = None;
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let cells = std::mem::take(&mut table.row);
                    table.rows.push(TableRow {
                        header: table.in_head,
                        cells,
                    });
                    table.in_head = false;
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.push_block(BlockKind::Table(table.rows));
                }
            }
            TagEnd::Emphasis | TagEnd::Image => {
                self.nesting.emphasis = self.nesting.emphasis.saturating_sub(1)
            }
            TagEnd::Strong => self.nesting.strong = self.nesting.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.nesting.strike = self.nesting.strike.saturating_sub(1),
            TagEnd::Link => self.nesting.link = self.nesting.link.saturating_sub(1),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        let style = InlineStyle {
            strong: self.nesting.strong > 0,
            emphasis: self.nesting.emphasis > 0,
            code,
            strike: self.nesting.strike > 0,
            link: self.nesting.link > 0,
        };
        match self.runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.runs.push(Run {
                text: text.to_string(),
                style,
            }),
        }
    }

    fn push_block(&mut self, kind: BlockKind) {
        self.blocks.push(Block {
            kind,
            quote_depth: self.quote_depth,
        });
    }

    /// Turns pending inline runs into a paragraph or list item.
    fn flush(&mut self) {
        if self.heading.is_some() {
            return;
        }
        if self.runs.iter().all(|run| run.text.trim().is_empty()) {
            self.runs.clear();
            return;
        }
        let runs = std::mem::take(&mut self.runs);
        let kind = if self.lists.is_empty() {
            BlockKind::Paragraph(runs)
        } else {
            BlockKind::ListItem {
                depth: self.lists.len(),
                marker: self.pending_marker.take().unwrap_or_default(),
                runs,
            }
        };
        self.push_block(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain(text: &str) -> Run {
        Run {
            text: text.to_string(),
            style: InlineStyle::default(),
        }
    }

    #[test]
    fn test_to_html() {
        let html = to_html("# Title\n\nBody *text*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<p>Body <em>text</em>.</p>"));
    }

    #[test]
    fn test_heading_and_paragraph() {
        let blocks = parse_blocks("# Title\n\nBody text.");
        assert_eq!(
            blocks,
            vec![
                Block {
                    kind: BlockKind::Heading {
                        level: 1,
                        runs: vec![plain("Title")]
                    },
                    quote_depth: 0
                },
                Block {
                    kind: BlockKind::Paragraph(vec![plain("Body text.")]),
                    quote_depth: 0
                },
            ]
        );
    }

    #[test]
    fn test_inline_styles_split_runs() {
        let blocks = parse_blocks("a **b** `c` ~~d~~");
        let BlockKind::Paragraph(runs) = &blocks[0].kind else {
            panic!("expected paragraph");
        };
        assert_eq!(runs.len(), 6);
        assert!(runs[1].style.strong);
        assert!(runs[3].style.code);
        assert!(runs[5].style.strike);
    }

    #[test]
    fn test_lists_get_markers_and_depth() {
        let blocks = parse_blocks("1. one\n2. two\n   - nested\n");
        let items: Vec<(usize, String)> = blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::ListItem { depth, marker, .. } => Some((*depth, marker.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (1, "1.".to_string()),
                (1, "2.".to_string()),
                (2, "\u{2022}".to_string())
            ]
        );
    }

    #[test]
    fn test_task_list_marker() {
        let blocks = parse_blocks("- [x] done\n- [ ] todo\n");
        let BlockKind::ListItem { runs, .. } = &blocks[0].kind else {
            panic!("expected list item");
        };
        assert_eq!(runs[0].text, "[x] done");
    }

    #[test]
    fn test_code_block_keeps_lines() {
        let blocks = parse_blocks("```rust\nfn main() {}\n    indented\n```\n");
        assert_eq!(
            blocks[0].kind,
            BlockKind::CodeBlock("fn main() {}\n    indented".to_string())
        );
    }

    #[test]
    fn test_blockquote_depth() {
        let blocks = parse_blocks("> quoted\n>\n> > deeper\n\nafter");
        let depths: Vec<usize> = blocks.iter().map(|b| b.quote_depth).collect();
        assert_eq!(depths, vec![1, 2, 0]);
    }

    #[test]
    fn test_table_rows() {
        let blocks = parse_blocks("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert_eq!(
            blocks[0].kind,
            BlockKind::Table(vec![
                TableRow {
                    header: true,
                    cells: vec!["a".into(), "b".into()]
                },
                TableRow {
                    header: false,
                    cells: vec!["1".into(), "2".into()]
                },
            ])
        );
    }

    #[test]
    fn test_rule_and_raw_html() {
        let blocks = parse_blocks("before\n\n---\n\n<div>raw</div>\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].kind, BlockKind::Rule);
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_blocks("").is_empty());
        assert!(parse_blocks("\n\n   \n").is_empty());
    }
}
