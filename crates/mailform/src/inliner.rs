//! Stylesheet inlining.
//!
//! Plain rules are merged into `style` attributes by `css-inline`. At-rules
//! (`@media`, `@font-face`, `@import`) cannot live in a `style` attribute, so
//! they are split off first and written back as a single `<style>` block.

use crate::{
    config::InlineOptions, error::MailerError, logger::Logger, source::FileResolver,
    templates::StylesheetSource,
};
use css_inline::CSSInliner;
use cssparser::{
    AtRuleParser, CowRcStr, ParseError, Parser, ParserInput, ParserState, QualifiedRuleParser,
    Token,
};
use std::borrow::Cow;
use tracing::debug;

/// A stylesheet split into inlinable rules and preserved at-rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitStylesheet {
    /// Plain rules, one per line
    pub rules: String,
    /// At-rules in source order
    pub at_rules: Vec<String>,
}

/// Inlines stylesheets into rendered HTML
#[derive(Debug, Clone, Default)]
pub struct StylesheetInliner {
    options: InlineOptions,
}

impl StylesheetInliner {
    pub fn new(options: InlineOptions) -> Self {
        Self { options }
    }

    /// Inline `css` into `html`
    ///
    /// Fails with [`MailerError::Inline`] when the stylesheet is malformed or
    /// the document cannot be processed.
    pub fn inline(&self, html: &str, css: &str) -> Result<String, MailerError> {
        let split = split_stylesheet(css)?;

        let mut preserved = Vec::new();
        if self.options.preserve_media_queries {
            // Style tags are about to be removed; keep their at-rules too.
            if self.options.remove_style_tags {
                for block in style_blocks(html) {
                    match split_stylesheet(block) {
                        Ok(existing) => preserved.extend(existing.at_rules),
                        Err(e) => debug!("Not preserving at-rules of a <style> block: {}", e),
                    }
                }
            }
            preserved.extend(split.at_rules);
        }

        let inlined = if is_fragment(html) {
            self.inliner(None).inline_fragment(html, &split.rules)?
        } else {
            let extra_css = if split.rules.trim().is_empty() {
                None
            } else {
                Some(Cow::Owned(split.rules))
            };
            self.inliner(extra_css).inline(html)?
        };

        Ok(insert_style_block(inlined, &preserved))
    }

    fn inliner<'a>(&self, extra_css: Option<Cow<'a, str>>) -> CSSInliner<'a> {
        CSSInliner::options()
            .keep_style_tags(!self.options.remove_style_tags)
            .load_remote_stylesheets(self.options.load_remote_resources)
            .extra_css(extra_css)
            .build()
    }

    /// Read every stylesheet and join them into one CSS text, in order
    pub fn load(
        &self,
        resolver: &dyn FileResolver,
        sources: &[StylesheetSource],
    ) -> Result<String, MailerError> {
        let mut css = String::new();
        for source in sources {
            let text = match source {
                StylesheetSource::Css(path) => resolver.read(path)?,
                StylesheetSource::Scss(path) => compile_scss(path, &resolver.read(path)?)?,
                StylesheetSource::Inline(text) => text.clone(),
            };
            css.push_str(&text);
            css.push('\n');
        }
        Ok(css)
    }

    /// Inline the stylesheets `owner` declares, best effort
    ///
    /// Any failure is logged and `html` comes back unchanged.
    pub fn apply(
        &self,
        resolver: &dyn FileResolver,
        logger: &dyn Logger,
        owner: &str,
        html: String,
        sources: &[StylesheetSource],
    ) -> String {
        if sources.is_empty() {
            return html;
        }

        match self
            .load(resolver, sources)
            .and_then(|css| self.inline(&html, &css))
        {
            Ok(inlined) => {
                debug!("Inlined {} stylesheet(s) into {}", sources.len(), owner);
                inlined
            }
            Err(e) => {
                logger.warn(&format!("Could not add CSS to {}: {}", owner, e));
                html
            }
        }
    }
}

/// Compile SCSS source to CSS
pub fn compile_scss(path: &str, source: &str) -> Result<String, MailerError> {
    grass::from_string(source.to_string(), &grass::Options::default())
        .map_err(|e| MailerError::stylesheet(path, e.to_string()))
}

/// Split a stylesheet into plain rules and at-rules
///
/// CDO/CDC tokens and comments between rules are skipped. Rules without a
/// block, unclosed blocks, stray closing brackets and bad strings or URLs
/// make the stylesheet malformed.
pub fn split_stylesheet(css: &str) -> Result<SplitStylesheet, MailerError> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut splitter = RuleSplitter {
        source_len: css.len(),
    };

    let mut split = SplitStylesheet::default();
    for rule in cssparser::StyleSheetParser::new(&mut parser, &mut splitter) {
        match rule {
            Ok(SplitRule::Plain(rule)) => {
                split.rules.push_str(&rule);
                split.rules.push('\n');
            }
            Ok(SplitRule::At(rule)) => split.at_rules.push(rule),
            Err((_, source)) => {
                return Err(MailerError::inline(format!(
                    "invalid CSS near '{}'",
                    source.trim()
                )))
            }
        }
    }

    Ok(split)
}

enum SplitRule {
    Plain(String),
    At(String),
}

struct AtPrelude {
    name: String,
    source: String,
}

/// Keeps the source text of every top-level rule
struct RuleSplitter {
    source_len: usize,
}

impl RuleSplitter {
    fn block_source<'i, 't>(
        &self,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<String, ParseError<'i, ()>> {
        consume_tokens(input)?;

        // A closed block stops before its '}', an unclosed one runs to the end.
        if input.position().byte_index() >= self.source_len {
            return Err(input.new_custom_error::<(), ()>(()));
        }

        Ok(format!("{}}}", input.slice_from(start.position())))
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleSplitter {
    type Prelude = ();
    type QualifiedRule = SplitRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        consume_tokens(input)
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        self.block_source(start, input).map(SplitRule::Plain)
    }
}

impl<'i> AtRuleParser<'i> for RuleSplitter {
    type Prelude = AtPrelude;
    type AtRule = SplitRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let from = input.position();
        consume_tokens(input)?;

        Ok(AtPrelude {
            name: name.as_ref().to_ascii_lowercase(),
            source: format!("@{}{}", name.as_ref(), input.slice_from(from)),
        })
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        match prelude.name.as_str() {
            "import" | "charset" | "namespace" | "layer" => {
                Ok(SplitRule::At(format!("{};", prelude.source.trim_end())))
            }
            _ => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        self.block_source(start, input).map(SplitRule::At)
    }
}

/// Consume the rest of `input`, descending into nested blocks
fn consume_tokens<'i, 't>(input: &mut Parser<'i, 't>) -> Result<(), ParseError<'i, ()>> {
    loop {
        let token = match input.next() {
            Ok(token) => token.clone(),
            Err(_) => return Ok(()),
        };

        match token {
            Token::BadString(_)
            | Token::BadUrl(_)
            | Token::CloseCurlyBracket
            | Token::CloseParenthesis
            | Token::CloseSquareBracket => return Err(input.new_custom_error::<(), ()>(())),
            Token::CurlyBracketBlock
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::Function(_) => input.parse_nested_block(consume_tokens)?,
            _ => {}
        }
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

/// Contents of every `<style>` element in `html`
fn style_blocks(html: &str) -> Vec<&str> {
    let lower = html.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut from = 0;

    while let Some(offset) = lower[from..].find("<style") {
        let tag = from + offset;
        let Some(open_end) = lower[tag..].find('>').map(|i| tag + i + 1) else {
            break;
        };
        let Some(close) = lower[open_end..].find("</style>").map(|i| open_end + i) else {
            break;
        };
        blocks.push(&html[open_end..close]);
        from = close + "</style>".len();
    }

    blocks
}

fn is_fragment(html: &str) -> bool {
    find_ignore_case(html, "<html").is_none()
}

fn insert_style_block(html: String, at_rules: &[String]) -> String {
    if at_rules.is_empty() {
        return html;
    }

    let block = format!("<style>\n{}\n</style>", at_rules.join("\n"));
    match find_ignore_case(&html, "</head>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..index]);
            out.push_str(&block);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", block, html),
    }
}
