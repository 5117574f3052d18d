//! Block layout and pagination at a fixed page geometry.
//!
//! Metrics follow the print stylesheet: 13px base text, 40px page margins,
//! 96 pixels per inch. Glyph advances are estimated per character class, so
//! the layout is deterministic and needs no font files.

use super::{Block, BlockKind, InlineStyle, Run, TableRow};
use crate::estimate::{available_height_px, available_width_px, mm_to_px};
use crate::options::PageDimensionsMm;

pub const BASE_FONT_PX: f64 = 13.0;
const BODY_LINE_HEIGHT: f64 = 1.5;
const PARAGRAPH_LINE_HEIGHT: f64 = 1.7;
const CODE_SCALE: f64 = 0.9;
const TABLE_SCALE: f64 = 0.95;
const LIST_INDENT_PX: f64 = 2.0 * BASE_FONT_PX;
const LIST_ITEM_GAP_PX: f64 = 0.25 * BASE_FONT_PX;
const BLOCK_GAP_PX: f64 = BASE_FONT_PX;
const QUOTE_BAR_PX: f64 = 4.0;
const QUOTE_INDENT_PX: f64 = QUOTE_BAR_PX + BASE_FONT_PX;
const RULE_MARGIN_PX: f64 = 2.0 * BASE_FONT_PX;
const RULE_THICKNESS_PX: f64 = 2.0;

const HEADING_SCALE: [f64; 6] = [1.8, 1.4, 1.2, 1.1, 1.1, 1.1];
const HEADING_MARGIN_EM: [f64; 6] = [0.67, 0.83, 1.0, 1.33, 1.67, 2.33];

pub const TEXT_COLOR: &str = "#333333";
pub const QUOTE_TEXT_COLOR: &str = "#666666";
pub const ACCENT_COLOR: &str = "#0095EB";
pub const BORDER_COLOR: &str = "#E0E0E0";
pub const CODE_BACKGROUND: &str = "#F5F5F5";
pub const STRIPE_BACKGROUND: &str = "#F9F9F9";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
    pub mono: bool,
    pub strike: bool,
    pub color: &'static str,
}

impl TextStyle {
    fn body(size: f64, color: &'static str) -> Self {
        Self {
            size,
            bold: false,
            italic: false,
            mono: false,
            strike: false,
            color,
        }
    }
}

/// A styled text segment. `x` and `baseline` are relative to the row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f64,
    pub baseline: f64,
    pub text: String,
    pub style: TextStyle,
}

/// Non-text decoration. Coordinates are relative to the row.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: &'static str,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        width: f64,
        color: &'static str,
    },
}

/// One horizontal strip of content; the unit of pagination.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub height: f64,
    /// Pure vertical spacing, dropped at the top of a page.
    pub spacer: bool,
    pub texts: Vec<PlacedText>,
    pub shapes: Vec<Shape>,
}

/// Content laid out at a page's printable width.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub page: PageDimensionsMm,
    pub content_width: f64,
    pub rows: Vec<Row>,
}

/// Rows placed on one page, each with its offset from the top margin.
#[derive(Debug, Default)]
pub struct LaidOutPage<'a> {
    pub rows: Vec<(f64, &'a Row)>,
}

impl DocumentLayout {
    /// Total content height in pixels, excluding page margins.
    pub fn content_height(&self) -> f64 {
        self.rows.iter().map(|row| row.height).sum()
    }

    pub fn page_width_px(&self) -> f64 {
        mm_to_px(self.page.width)
    }

    pub fn page_height_px(&self) -> f64 {
        mm_to_px(self.page.height)
    }

    /// Flows rows onto pages. Always yields at least one page.
    pub fn paginate(&self) -> Vec<LaidOutPage<'_>> {
        let available = available_height_px(self.page).max(1.0);
        let mut pages = vec![LaidOutPage::default()];
        let mut cursor = 0.0;

        for row in &self.rows {
            if row.spacer && cursor == 0.0 {
                continue;
            }
            if cursor > 0.0 && cursor + row.height > available {
                if row.spacer {
                    // The gap fills the rest of the page.
                    cursor = available;
                    continue;
                }
                pages.push(LaidOutPage::default());
                cursor = 0.0;
            }
            if let Some(page) = pages.last_mut() {
                page.rows.push((cursor, row));
            }
            cursor += row.height;
        }
        pages
    }
}

/// Lays out parsed blocks for the given page size.
pub fn layout_document(blocks: &[Block], page: PageDimensionsMm) -> DocumentLayout {
    let content_width = available_width_px(page).max(1.0);
    let mut engine = Engine {
        width: content_width,
        rows: Vec::new(),
    };
    for (index, block) in blocks.iter().enumerate() {
        engine.block(block, blocks.get(index + 1));
    }
    DocumentLayout {
        page,
        content_width,
        rows: engine.rows,
    }
}

/// Indivisible unit of wrapping.
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    style: TextStyle,
    width: f64,
    kind: PieceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceKind {
    Word,
    Space,
    Break,
}

struct Engine {
    width: f64,
    rows: Vec<Row>,
}

impl Engine {
    fn block(&mut self, block: &Block, next: Option<&Block>) {
        let first_row = self.rows.len();
        let indent = block.quote_depth as f64 * QUOTE_INDENT_PX;
        let width = (self.width - indent).max(1.0);
        let color = if block.quote_depth > 0 {
            QUOTE_TEXT_COLOR
        } else {
            TEXT_COLOR
        };

        match &block.kind {
            BlockKind::Heading { level, runs } => self.heading(*level, runs, indent, width, color),
            BlockKind::Paragraph(runs) => {
                let base = TextStyle::body(BASE_FONT_PX, color);
                self.text_rows(runs, base, indent, width, PARAGRAPH_LINE_HEIGHT, None);
                self.spacer(BLOCK_GAP_PX);
            }
            BlockKind::ListItem {
                depth,
                marker,
                runs,
            } => {
                let offset = *depth as f64 * LIST_INDENT_PX;
                let base = TextStyle::body(BASE_FONT_PX, color);
                let marker = (!marker.is_empty()).then_some(marker.as_str());
                self.text_rows(
                    runs,
                    base,
                    indent + offset,
                    (width - offset).max(1.0),
                    PARAGRAPH_LINE_HEIGHT,
                    marker,
                );
                let continues = matches!(
                    next,
                    Some(Block { kind: BlockKind::ListItem { .. }, quote_depth }) if *quote_depth == block.quote_depth
                );
                self.spacer(if continues {
                    LIST_ITEM_GAP_PX
                } else {
                    BLOCK_GAP_PX
                });
            }
            BlockKind::CodeBlock(code) => self.code_block(code, indent, width),
            BlockKind::Table(rows) => self.table(rows, indent, width, color),
            BlockKind::Rule => {
                self.spacer(RULE_MARGIN_PX);
                self.rows.push(Row {
                    height: RULE_THICKNESS_PX,
                    shapes: vec![Shape::Rect {
                        x: indent,
                        y: 0.0,
                        width,
                        height: RULE_THICKNESS_PX,
                        fill: BORDER_COLOR,
                    }],
                    ..Row::default()
                });
                self.spacer(RULE_MARGIN_PX);
            }
        }

        if block.quote_depth > 0 {
            for row in self.rows[first_row..].iter_mut().filter(|row| !row.spacer) {
                for level in 0..block.quote_depth {
                    let x = level as f64 * QUOTE_INDENT_PX + QUOTE_BAR_PX / 2.0;
                    row.shapes.push(Shape::Line {
                        x1: x,
                        y1: 0.0,
                        x2: x,
                        y2: row.height,
                        width: QUOTE_BAR_PX,
                        color: ACCENT_COLOR,
                    });
                }
            }
        }
    }

    fn spacer(&mut self, height: f64) {
        if height > 0.0 {
            self.rows.push(Row {
                height,
                spacer: true,
                ..Row::default()
            });
        }
    }

    fn heading(&mut self, level: u8, runs: &[Run], x: f64, width: f64, color: &'static str) {
        let index = usize::from(level.clamp(1, 6)) - 1;
        let size = BASE_FONT_PX * HEADING_SCALE[index];
        let margin = size * HEADING_MARGIN_EM[index];
        let base = TextStyle {
            bold: true,
            ..TextStyle::body(size, color)
        };

        self.spacer(margin);
        self.text_rows(runs, base, x, width, BODY_LINE_HEIGHT, None);

        let underline = match level {
            1 => Some((0.3, 2.0)),
            2 => Some((0.2, 1.0)),
            _ => None,
        };
        if let Some((padding_em, thickness)) = underline {
            self.spacer(size * padding_em);
            self.rows.push(Row {
                height: thickness,
                shapes: vec![Shape::Rect {
                    x,
                    y: 0.0,
                    width,
                    height: thickness,
                    fill: BORDER_COLOR,
                }],
                ..Row::default()
            });
        }
        self.spacer(margin);
    }

    fn text_rows(
        &mut self,
        runs: &[Run],
        base: TextStyle,
        x: f64,
        width: f64,
        line_height: f64,
        marker: Option<&str>,
    ) {
        let height = base.size * line_height;
        let baseline = baseline_for(height, base.size);
        let lines = wrap(pieces(runs, base), width);

        for (index, line) in lines.into_iter().enumerate() {
            let mut row = Row {
                height,
                texts: place(line, x, baseline),
                ..Row::default()
            };
            if let (0, Some(marker)) = (index, marker) {
                let marker_width = text_width(marker, &base);
                row.texts.insert(
                    0,
                    PlacedText {
                        x: x - marker_width - base.size * 0.4,
                        baseline,
                        text: marker.to_string(),
                        style: base,
                    },
                );
            }
            self.rows.push(row);
        }
    }

    fn code_block(&mut self, code: &str, x: f64, width: f64) {
        let style = TextStyle {
            mono: true,
            ..TextStyle::body(BASE_FONT_PX * CODE_SCALE, TEXT_COLOR)
        };
        let padding = style.size;
        let height = style.size * BODY_LINE_HEIGHT;
        let baseline = baseline_for(height, style.size);
        let inner = (width - 2.0 * padding).max(style.size);

        let background = |row_height: f64| Shape::Rect {
            x,
            y: 0.0,
            width,
            height: row_height,
            fill: CODE_BACKGROUND,
        };
        let side_borders = |row_height: f64| {
            [x, x + width].map(|edge| Shape::Line {
                x1: edge,
                y1: 0.0,
                x2: edge,
                y2: row_height,
                width: 1.0,
                color: BORDER_COLOR,
            })
        };
        let edge_row = |top: bool| {
            let y = if top { 0.0 } else { padding };
            let mut shapes = vec![background(padding)];
            shapes.extend(side_borders(padding));
            shapes.push(Shape::Line {
                x1: x,
                y1: y,
                x2: x + width,
                y2: y,
                width: 1.0,
                color: BORDER_COLOR,
            });
            Row {
                height: padding,
                shapes,
                ..Row::default()
            }
        };

        self.rows.push(edge_row(true));
        for source_line in code.replace('\t', "    ").split('\n') {
            for chunk in split_to_width(source_line, &style, inner) {
                let mut shapes = vec![background(height)];
                shapes.extend(side_borders(height));
                let texts = if chunk.is_empty() {
                    Vec::new()
                } else {
                    vec![PlacedText {
                        x: x + padding,
                        baseline,
                        text: chunk,
                        style,
                    }]
                };
                self.rows.push(Row {
                    height,
                    texts,
                    shapes,
                    ..Row::default()
                });
            }
        }
        self.rows.push(edge_row(false));
        self.spacer(BLOCK_GAP_PX);
    }

    /// Lays out a table with equal-width columns. Cells wrap inside their
    /// column; each wrapped line becomes its own row so a tall table row can
    /// still break across pages.
    fn table(&mut self, rows: &[TableRow], x: f64, width: f64, color: &'static str) {
        let columns = rows.iter().map(|row| row.cells.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let size = BASE_FONT_PX * TABLE_SCALE;
        let pad_x = size;
        let pad_y = size * 0.5;
        let line_height = size * BODY_LINE_HEIGHT;
        let column_width = width / columns as f64;
        let cell_width = (column_width - 2.0 * pad_x).max(size);
        let last = rows.len().saturating_sub(1);
        let mut body_index = 0;

        for (index, table_row) in rows.iter().enumerate() {
            let style = TextStyle {
                bold: table_row.header,
                ..TextStyle::body(size, color)
            };
            let fill = if table_row.header {
                Some(CODE_BACKGROUND)
            } else {
                body_index += 1;
                (body_index % 2 == 0).then_some(STRIPE_BACKGROUND)
            };

            let cells: Vec<Vec<Vec<Piece>>> = table_row
                .cells
                .iter()
                .map(|cell| {
                    let run = Run {
                        text: cell.clone(),
                        style: InlineStyle::default(),
                    };
                    wrap(pieces(std::slice::from_ref(&run), style), cell_width)
                })
                .collect();
            let line_count = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);

            for line in 0..line_count {
                let first = line == 0;
                let final_line = line + 1 == line_count;
                let top = if first { pad_y } else { 0.0 };
                let height = line_height + top + if final_line { pad_y } else { 0.0 };
                let baseline = top + baseline_for(line_height, size);

                let mut shapes = Vec::new();
                if let Some(fill) = fill {
                    shapes.push(Shape::Rect {
                        x,
                        y: 0.0,
                        width,
                        height,
                        fill,
                    });
                }
                let mut horizontal = Vec::new();
                if first {
                    horizontal.push(0.0);
                }
                if final_line && index == last {
                    horizontal.push(height);
                }
                for y in horizontal {
                    shapes.push(Shape::Line {
                        x1: x,
                        y1: y,
                        x2: x + width,
                        y2: y,
                        width: 1.0,
                        color: BORDER_COLOR,
                    });
                }
                for column in 0..=columns {
                    let edge = x + column as f64 * column_width;
                    shapes.push(Shape::Line {
                        x1: edge,
                        y1: 0.0,
                        x2: edge,
                        y2: height,
                        width: 1.0,
                        color: BORDER_COLOR,
                    });
                }

                let texts = cells
                    .iter()
                    .enumerate()
                    .filter_map(|(column, lines)| Some((column, lines.get(line)?.clone())))
                    .flat_map(|(column, pieces)| {
                        place(pieces, x + column as f64 * column_width + pad_x, baseline)
                    })
                    .collect();

                self.rows.push(Row {
                    height,
                    texts,
                    shapes,
                    ..Row::default()
                });
            }
        }
        self.spacer(BLOCK_GAP_PX);
    }
}

fn baseline_for(row_height: f64, font_size: f64) -> f64 {
    row_height / 2.0 + font_size * 0.35
}

fn run_style(run: &Run, base: TextStyle) -> TextStyle {
    TextStyle {
        size: if run.style.code {
            base.size * CODE_SCALE
        } else {
            base.size
        },
        bold: base.bold || run.style.strong,
        italic: base.italic || run.style.emphasis,
        mono: base.mono || run.style.code,
        strike: base.strike || run.style.strike,
        color: if run.style.link {
            ACCENT_COLOR
        } else {
            base.color
        },
    }
}

/// Splits runs into words, single spaces, hard breaks and wide characters.
fn pieces(runs: &[Run], base: TextStyle) -> Vec<Piece> {
    let mut out = Vec::new();
    for run in runs {
        let style = run_style(run, base);
        let mut word = String::new();
        let flush = |word: &mut String, out: &mut Vec<Piece>| {
            if !word.is_empty() {
                let text = std::mem::take(word);
                out.push(Piece {
                    width: text_width(&text, &style),
                    text,
                    style,
                    kind: PieceKind::Word,
                });
            }
        };

        for c in run.text.chars() {
            if c == '\n' {
                flush(&mut word, &mut out);
                out.push(Piece {
                    text: String::new(),
                    style,
                    width: 0.0,
                    kind: PieceKind::Break,
                });
            } else if c.is_whitespace() {
                flush(&mut word, &mut out);
                if !matches!(out.last(), Some(p) if p.kind == PieceKind::Space) {
                    out.push(Piece {
                        text: " ".to_string(),
                        style,
                        width: advance(' ', &style),
                        kind: PieceKind::Space,
                    });
                }
            } else if is_wide(c) {
                flush(&mut word, &mut out);
                out.push(Piece {
                    text: c.to_string(),
                    style,
                    width: advance(c, &style),
                    kind: PieceKind::Word,
                });
            } else {
                word.push(c);
            }
        }
        flush(&mut word, &mut out);
    }
    out
}

/// Greedy line breaking. Words wider than a line are split by character.
fn wrap(pieces: Vec<Piece>, width: f64) -> Vec<Vec<Piece>> {
    let mut lines = Vec::new();
    let mut line: Vec<Piece> = Vec::new();
    let mut used = 0.0;

    let mut finish = |line: &mut Vec<Piece>, used: &mut f64| {
        while matches!(line.last(), Some(p) if p.kind == PieceKind::Space) {
            line.pop();
        }
        lines.push(std::mem::take(line));
        *used = 0.0;
    };

    for piece in pieces {
        match piece.kind {
            PieceKind::Break => finish(&mut line, &mut used),
            PieceKind::Space => {
                if !line.is_empty() {
                    used += piece.width;
                    line.push(piece);
                }
            }
            PieceKind::Word => {
                if !line.is_empty() && used + piece.width > width {
                    finish(&mut line, &mut used);
                }
                if piece.width <= width {
                    used += piece.width;
                    line.push(piece);
                    continue;
                }
                for c in piece.text.chars() {
                    let char_width = advance(c, &piece.style);
                    if !line.is_empty() && used + char_width > width {
                        finish(&mut line, &mut used);
                    }
                    used += char_width;
                    line.push(Piece {
                        text: c.to_string(),
                        style: piece.style,
                        width: char_width,
                        kind: PieceKind::Word,
                    });
                }
            }
        }
    }
    if !line.is_empty() {
        finish(&mut line, &mut used);
    }
    lines
}

/// Positions a wrapped line, merging neighbours that share a style.
fn place(line: Vec<Piece>, x: f64, baseline: f64) -> Vec<PlacedText> {
    let mut placed: Vec<PlacedText> = Vec::new();
    let mut cursor = x;
    for piece in line {
        match placed.last_mut() {
            Some(last) if last.style == piece.style => last.text.push_str(&piece.text),
            _ => placed.push(PlacedText {
                x: cursor,
                baseline,
                text: piece.text,
                style: piece.style,
            }),
        }
        cursor += piece.width;
    }
    placed.retain(|text| !text.text.trim().is_empty());
    placed
}

fn split_to_width(line: &str, style: &TextStyle, width: f64) -> Vec<String> {
    let mut chunks = vec![String::new()];
    let mut used = 0.0;
    for c in line.chars() {
        let char_width = advance(c, style);
        if used + char_width > width && chunks.last().is_some_and(|chunk| !chunk.is_empty()) {
            chunks.push(String::new());
            used = 0.0;
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.push(c);
        }
        used += char_width;
    }
    chunks
}

pub(crate) fn text_width(text: &str, style: &TextStyle) -> f64 {
    text.chars().map(|c| advance(c, style)).sum()
}

/// Estimated advance of one character in pixels.
fn advance(c: char, style: &TextStyle) -> f64 {
    let em = if style.mono {
        0.6
    } else if is_wide(c) {
        1.0
    } else {
        match c {
            ' ' | 'i' | 'j' | 'l' | 'I' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 0.28,
            'm' | 'w' | 'M' | 'W' => 0.82,
            c if c.is_ascii_uppercase() || c.is_ascii_digit() => 0.62,
            _ => 0.52,
        }
    };
    let weight = if style.bold && !style.mono { 1.06 } else { 1.0 };
    em * style.size * weight
}

/// East Asian wide and emoji ranges, which break between any two characters.
fn is_wide(c: char) -> bool {
    matches!(
        c as u32,
        0x1100..=0x115F
            | 0x2E80..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x1F300..=0x1FAFF
            | 0x20000..=0x3FFFD
    )
}
