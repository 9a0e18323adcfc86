//! A small wikitext reader covering the shapes that item and strategy pages
//! use: templates, wikilinks, HTML-like tags, comments and headings.
//!
//! Anything the reader cannot close (an unterminated `{{`, a `<br>` with no
//! matching `</br>`) is kept as plain text instead of failing the page.

use std::collections::HashSet;

const MAX_HEADING_LEVEL: usize = 6;
const RAW_CONTENT_TAGS: [&str; 5] = ["nowiki", "pre", "math", "syntaxhighlight", "source"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wikicode {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Comment(String),
    Template(Template),
    WikiLink(WikiLink),
    Tag(Tag),
    Heading(Heading),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: Wikicode,
    pub params: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Raw key as written for keyword parameters, or the 1-based position
    /// among positional parameters.
    pub name: String,
    pub value: Wikicode,
    pub showkey: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    pub target: String,
    pub text: Option<Wikicode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased tag name.
    pub name: String,
    pub open: String,
    pub contents: Wikicode,
    pub close: String,
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub title: Wikicode,
}

impl Wikicode {
    pub fn parse(source: &str) -> Self {
        let mut parser = Parser::new(source);
        let (nodes, _) = parser.parse_nodes(&[], true);
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reassemble the markup this tree was read from.
    pub fn to_source(&self) -> String {
        let mut output = String::new();
        for node in &self.nodes {
            node.write_source(&mut output);
        }
        output
    }

    /// Source text with comments removed.
    pub fn plain_text(&self) -> String {
        let mut output = String::new();
        for node in &self.nodes {
            if !matches!(node, Node::Comment(_)) {
                node.write_source(&mut output);
            }
        }
        output
    }

    /// Templates that sit directly in this node list, in document order.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Template(template) => Some(template),
            _ => None,
        })
    }

    /// Every node in the tree, parents before children, in document order.
    pub fn descendants(&self) -> Vec<&Node> {
        let mut output = Vec::new();
        collect_descendants(self, &mut output);
        output
    }

    /// Every template in the tree (nested ones included), in document order.
    pub fn filter_templates(&self) -> Vec<&Template> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::Template(template) => Some(template),
                _ => None,
            })
            .collect()
    }

    pub fn templates_named(&self, name: &str) -> Vec<&Template> {
        self.filter_templates()
            .into_iter()
            .filter(|template| template.name_matches(name))
            .collect()
    }

    pub fn wikilinks(&self) -> Vec<&WikiLink> {
        self.descendants()
            .into_iter()
            .filter_map(|node| match node {
                Node::WikiLink(link) => Some(link),
                _ => None,
            })
            .collect()
    }

    /// The first section whose heading matches `heading`, from the heading
    /// itself up to the next heading of the same or a higher level.
    pub fn section(&self, heading: &str) -> Option<Wikicode> {
        let mut start = None::<(usize, usize)>;
        for (index, node) in self.nodes.iter().enumerate() {
            let Node::Heading(current) = node else {
                continue;
            };
            match start {
                None => {
                    if names_match(&current.title.plain_text(), heading) {
                        start = Some((index, current.level));
                    }
                }
                Some((begin, level)) => {
                    if current.level <= level {
                        return Some(Wikicode {
                            nodes: self.nodes[begin..index].to_vec(),
                        });
                    }
                }
            }
        }
        start.map(|(begin, _)| Wikicode {
            nodes: self.nodes[begin..].to_vec(),
        })
    }
}

impl Node {
    /// Child trees in the order they appear in the markup.
    pub fn children(&self) -> Vec<&Wikicode> {
        match self {
            Node::Text(_) | Node::Comment(_) => Vec::new(),
            Node::Template(template) => {
                let mut output = Vec::with_capacity(template.params.len() + 1);
                output.push(&template.name);
                for param in &template.params {
                    output.push(&param.value);
                }
                output
            }
            Node::WikiLink(link) => link.text.iter().collect(),
            Node::Tag(tag) => vec![&tag.contents],
            Node::Heading(heading) => vec![&heading.title],
        }
    }

    pub fn is_tag(&self, name: &str) -> bool {
        matches!(self, Node::Tag(tag) if tag.name.eq_ignore_ascii_case(name))
    }

    fn write_source(&self, output: &mut String) {
        match self {
            Node::Text(text) => output.push_str(text),
            Node::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
            Node::Template(template) => template.write_source(output),
            Node::WikiLink(link) => {
                output.push_str("[[");
                output.push_str(&link.target);
                if let Some(text) = &link.text {
                    output.push('|');
                    output.push_str(&text.to_source());
                }
                output.push_str("]]");
            }
            Node::Tag(tag) => {
                output.push_str(&tag.open);
                if !tag.self_closing {
                    output.push_str(&tag.contents.to_source());
                    output.push_str(&tag.close);
                }
            }
            Node::Heading(heading) => {
                let marks = "=".repeat(heading.level);
                output.push_str(&marks);
                output.push_str(&heading.title.to_source());
                output.push_str(&marks);
            }
        }
    }
}

impl Template {
    pub fn to_source(&self) -> String {
        let mut output = String::new();
        self.write_source(&mut output);
        output
    }

    fn write_source(&self, output: &mut String) {
        output.push_str("{{");
        output.push_str(&self.name.to_source());
        for param in &self.params {
            output.push('|');
            if param.showkey {
                output.push_str(&param.name);
                output.push('=');
            }
            output.push_str(&param.value.to_source());
        }
        output.push_str("}}");
    }

    pub fn name_matches(&self, name: &str) -> bool {
        names_match(&self.name.plain_text(), name)
    }

    /// Last parameter with this name, matching MediaWiki's "last one wins".
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        let wanted = name.trim();
        self.params.iter().rev().find(|param| param.name() == wanted)
    }

    pub fn first_param(&self) -> Option<&Parameter> {
        self.params.first()
    }

    pub fn positional(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|param| !param.showkey)
    }
}

impl Parameter {
    pub fn name(&self) -> &str {
        self.name.trim()
    }

    pub fn value_text(&self) -> String {
        self.value.to_source().trim().to_string()
    }
}

impl WikiLink {
    /// Link target with surrounding whitespace and any leading colon removed.
    pub fn title(&self) -> &str {
        self.target.trim().trim_start_matches(':').trim()
    }
}

/// Canonical form of a page or template name: underscores read as spaces and
/// whitespace runs collapsed.
pub fn normalize_name(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;
    for ch in value.chars() {
        if ch == '_' || ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }
    output.trim().to_string()
}

/// MediaWiki title comparison: normalized, first character case-insensitive.
pub fn names_match(left: &str, right: &str) -> bool {
    let left = normalize_name(left);
    let right = normalize_name(right);
    let mut left_chars = left.chars();
    let mut right_chars = right.chars();
    match (left_chars.next(), right_chars.next()) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.to_lowercase().eq(b.to_lowercase()) && left_chars.as_str() == right_chars.as_str()
        }
        _ => false,
    }
}

fn collect_descendants<'a>(code: &'a Wikicode, output: &mut Vec<&'a Node>) {
    for node in &code.nodes {
        output.push(node);
        for child in node.children() {
            collect_descendants(child, output);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Stop {
    Pipe,
    TemplateClose,
    LinkClose,
    TagClose(String),
}

impl Stop {
    fn matches(&self, rest: &str) -> bool {
        match self {
            Stop::Pipe => rest.starts_with('|'),
            Stop::TemplateClose => rest.starts_with("}}"),
            Stop::LinkClose => rest.starts_with("]]"),
            Stop::TagClose(name) => is_closing_tag(rest, name),
        }
    }
}

/// Offsets where a construct already failed to close. Templates and links
/// parse the same way wherever they appear; a tag also depends on the stops
/// around it.
#[derive(Debug, Default)]
struct FailedOpeners {
    templates: HashSet<usize>,
    links: HashSet<usize>,
    tags: HashSet<(usize, Vec<Stop>)>,
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    failed: FailedOpeners,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            failed: FailedOpeners::default(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.source.as_bytes()[self.pos - 1] == b'\n'
    }

    /// Read nodes until one of `stops` is reached (left unconsumed) or input
    /// ends. Returns the stop that ended the run, `None` at end of input.
    fn parse_nodes(&mut self, stops: &[Stop], headings: bool) -> (Vec<Node>, Option<Stop>) {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while self.pos < self.source.len() {
            let rest = self.rest();
            if let Some(stop) = stops.iter().find(|stop| stop.matches(rest)) {
                flush_text(&mut text, &mut nodes);
                return (nodes, Some(stop.clone()));
            }

            if headings
                && rest.starts_with('=')
                && self.at_line_start()
                && let Some(heading) = self.try_heading()
            {
                flush_text(&mut text, &mut nodes);
                nodes.push(Node::Heading(heading));
                continue;
            }

            if rest.starts_with("<!--") {
                flush_text(&mut text, &mut nodes);
                let body_start = self.pos + 4;
                let (body, next) = match self.source[body_start..].find("-->") {
                    Some(offset) => (
                        &self.source[body_start..body_start + offset],
                        body_start + offset + 3,
                    ),
                    None => (&self.source[body_start..], self.source.len()),
                };
                nodes.push(Node::Comment(body.to_string()));
                self.pos = next;
                continue;
            }

            if rest.starts_with("{{{")
                && let Some(offset) = rest[3..].find("}}}")
            {
                let end = self.pos + 3 + offset + 3;
                text.push_str(&self.source[self.pos..end]);
                self.pos = end;
                continue;
            }

            if rest.starts_with("{{") {
                let save = self.pos;
                let template = if self.failed.templates.contains(&save) {
                    None
                } else {
                    self.try_template()
                };
                match template {
                    Some(template) => {
                        flush_text(&mut text, &mut nodes);
                        nodes.push(Node::Template(template));
                    }
                    None => {
                        self.failed.templates.insert(save);
                        self.pos = save + 2;
                        text.push_str("{{");
                    }
                }
                continue;
            }

            if rest.starts_with("[[") {
                let save = self.pos;
                let link = if self.failed.links.contains(&save) {
                    None
                } else {
                    self.try_wikilink()
                };
                match link {
                    Some(link) => {
                        flush_text(&mut text, &mut nodes);
                        nodes.push(Node::WikiLink(link));
                    }
                    None => {
                        self.failed.links.insert(save);
                        self.pos = save + 2;
                        text.push_str("[[");
                    }
                }
                continue;
            }

            if rest.starts_with('<') {
                let save = self.pos;
                let key = (save, stops.to_vec());
                if !self.failed.tags.contains(&key) {
                    match self.try_tag(stops) {
                        Some(tag) => {
                            flush_text(&mut text, &mut nodes);
                            nodes.push(Node::Tag(tag));
                            continue;
                        }
                        None => {
                            self.failed.tags.insert(key);
                        }
                    }
                }
                self.pos = save;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            text.push(ch);
            self.pos += ch.len_utf8();
        }

        flush_text(&mut text, &mut nodes);
        (nodes, None)
    }

    fn try_heading(&mut self) -> Option<Heading> {
        let rest = self.rest();
        let line = rest.split('\n').next().unwrap_or("");
        let trimmed = line.trim_end();
        let leading = trimmed.chars().take_while(|ch| *ch == '=').count();
        let trailing = trimmed.chars().rev().take_while(|ch| *ch == '=').count();
        let level = leading.min(trailing).min(MAX_HEADING_LEVEL);
        if level == 0 || trimmed.len() <= level * 2 {
            return None;
        }
        let inner = &trimmed[level..trimmed.len() - level];
        if inner.trim().is_empty() {
            return None;
        }
        let mut inner_parser = Parser::new(inner);
        let (title, _) = inner_parser.parse_nodes(&[], false);
        self.pos += line.len();
        Some(Heading {
            level,
            title: Wikicode { nodes: title },
        })
    }

    fn try_template(&mut self) -> Option<Template> {
        self.pos += 2;
        let (name_nodes, stop) = self.parse_nodes(&[Stop::Pipe, Stop::TemplateClose], false);
        stop?;
        let name = Wikicode { nodes: name_nodes };
        if name.plain_text().trim().is_empty() {
            return None;
        }

        let mut params = Vec::new();
        let mut position = 0usize;
        loop {
            let rest = self.rest();
            if rest.starts_with("}}") {
                self.pos += 2;
                return Some(Template { name, params });
            }
            if !rest.starts_with('|') {
                return None;
            }
            self.pos += 1;
            let (value_nodes, stop) = self.parse_nodes(&[Stop::Pipe, Stop::TemplateClose], false);
            stop?;
            params.push(build_parameter(value_nodes, &mut position));
        }
    }

    fn try_wikilink(&mut self) -> Option<WikiLink> {
        let target_start = self.pos + 2;
        let rest = &self.source[target_start..];
        let mut offset = 0usize;
        for (index, ch) in rest.char_indices() {
            if ch == '\n' {
                return None;
            }
            if ch == '|' || rest[index..].starts_with("]]") || rest[index..].starts_with("[[") {
                offset = index;
                break;
            }
            offset = index + ch.len_utf8();
        }
        let after = &rest[offset..];
        let target = rest[..offset].to_string();
        if target.trim().is_empty() {
            return None;
        }

        if after.starts_with("]]") {
            self.pos = target_start + offset + 2;
            return Some(WikiLink { target, text: None });
        }
        if !after.starts_with('|') {
            return None;
        }
        self.pos = target_start + offset + 1;
        let (label, stop) = self.parse_nodes(&[Stop::LinkClose], false);
        stop?;
        self.pos += 2;
        Some(WikiLink {
            target,
            text: Some(Wikicode { nodes: label }),
        })
    }

    /// A tag whose close lies beyond one of the `enclosing` stops does not
    /// contain them; it is left as text.
    fn try_tag(&mut self, enclosing: &[Stop]) -> Option<Tag> {
        let rest = self.rest();
        let name_len = rest[1..]
            .char_indices()
            .take_while(|(index, ch)| {
                if *index == 0 {
                    ch.is_ascii_alphabetic()
                } else {
                    ch.is_ascii_alphanumeric()
                }
            })
            .count();
        if name_len == 0 {
            return None;
        }
        let name = rest[1..1 + name_len].to_ascii_lowercase();
        let after_name = &rest[1 + name_len..];
        if !(after_name.starts_with('>')
            || after_name.starts_with("/>")
            || after_name.starts_with(char::is_whitespace))
        {
            return None;
        }

        let open_end = find_open_tag_end(rest)?;
        let open = rest[..=open_end].to_string();
        if open.ends_with("/>") {
            self.pos += open_end + 1;
            return Some(Tag {
                name,
                open,
                contents: Wikicode::default(),
                close: String::new(),
                self_closing: true,
            });
        }

        let body_start = self.pos + open_end + 1;
        let close_offset = find_closing_tag(&self.source[body_start..], &name)?;

        let contents = if RAW_CONTENT_TAGS.contains(&name.as_str()) {
            self.pos = body_start + close_offset;
            let raw = &self.source[body_start..body_start + close_offset];
            if raw.is_empty() {
                Wikicode::default()
            } else {
                Wikicode {
                    nodes: vec![Node::Text(raw.to_string())],
                }
            }
        } else {
            let own_close = Stop::TagClose(name.clone());
            let mut stops = Vec::with_capacity(enclosing.len() + 1);
            stops.push(own_close.clone());
            stops.extend(enclosing.iter().filter(|stop| **stop != own_close).cloned());
            self.pos = body_start;
            let (nodes, stop) = self.parse_nodes(&stops, false);
            if stop != Some(own_close) {
                return None;
            }
            Wikicode { nodes }
        };

        let close_rest = self.rest();
        let close_end = close_rest.find('>')?;
        let close = close_rest[..=close_end].to_string();
        self.pos += close_end + 1;
        Some(Tag {
            name,
            open,
            contents,
            close,
            self_closing: false,
        })
    }
}

fn build_parameter(mut nodes: Vec<Node>, position: &mut usize) -> Parameter {
    if let Some(Node::Text(first)) = nodes.first()
        && let Some(split) = first.find('=')
    {
        let key = first[..split].to_string();
        let remainder = first[split + 1..].to_string();
        if remainder.is_empty() {
            nodes.remove(0);
        } else {
            nodes[0] = Node::Text(remainder);
        }
        return Parameter {
            name: key,
            value: Wikicode { nodes },
            showkey: true,
        };
    }

    *position += 1;
    Parameter {
        name: position.to_string(),
        value: Wikicode { nodes },
        showkey: false,
    }
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

fn find_open_tag_end(rest: &str) -> Option<usize> {
    let mut quote = None::<char>;
    for (index, ch) in rest.char_indices().skip(1) {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '>' => return Some(index),
            None if ch == '<' => return None,
            None => {}
        }
    }
    None
}

fn find_closing_tag(haystack: &str, name: &str) -> Option<usize> {
    let mut index = 0usize;
    while let Some(offset) = haystack[index..].find("</") {
        let at = index + offset;
        if is_closing_tag(&haystack[at..], name) {
            return Some(at);
        }
        index = at + 2;
    }
    None
}

fn is_closing_tag(rest: &str, name: &str) -> bool {
    let Some(after_slash) = rest.strip_prefix("</") else {
        return false;
    };
    if after_slash.len() < name.len() || !after_slash.is_char_boundary(name.len()) {
        return false;
    }
    if !after_slash[..name.len()].eq_ignore_ascii_case(name) {
        return false;
    }
    let tail = &after_slash[name.len()..];
    tail.starts_with('>') || tail.starts_with(char::is_whitespace)
}
