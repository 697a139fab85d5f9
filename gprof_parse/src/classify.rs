//! Line shapes of a gprof report.
//!
//! Every matcher here is a pure function from one line to a typed record, or
//! `None` when the line does not have that shape. Several shapes are syntactic
//! subsets of others (a short flat line matches the first half of a full one),
//! so callers must try them in the order the `classify_*` functions use.
//!
//! Examples of the shapes handled:
//!
//! ```text
//!  time   seconds   seconds    calls  ms/call  ms/call  name      flat header
//!  50.00      1.00     1.00        2   500.00   500.00  foo       flat, full
//!  10.00      5.00     0.50                             bar       flat, short
//! index % time    self  children    called     name           call graph header
//!                                                  <spontaneous>
//! [1]    50.0    1.00    0.00       2+1         foo [1]        function line
//!                 0.02    0.22      10/10          main [1]     caller / callee
//!                                      2             foo [1]     count-only arc
//! -----------------------------------------------               entry rule
//! ```

/// One row of the flat profile.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub time_pct: f64,
    pub cumulative_secs: f64,
    pub self_secs: f64,
    /// Absent on short lines, where gprof leaves the column blank.
    pub calls: Option<u64>,
    pub self_ms_per_call: Option<f64>,
    pub total_ms_per_call: Option<f64>,
    pub name: String,
}

/// A caller or callee line inside a call graph entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcLine {
    /// Absent on count-only lines.
    pub self_secs: Option<f64>,
    pub child_secs: Option<f64>,
    pub calls: u64,
    pub total_calls: Option<u64>,
    pub name: String,
    /// gprof's per-report index. Not stable across reports.
    pub index: u32,
}

/// The primary line of a call graph entry, the one starting with `[index]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLine {
    pub index: u32,
    pub time_pct: Option<f64>,
    pub self_secs: f64,
    pub child_secs: f64,
    pub calls: Option<u64>,
    /// The `+N` suffix on the called column.
    pub recursive_calls: u64,
    pub name: String,
}

/// Classification of a line inside the flat profile table.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatLine {
    Entry(FlatEntry),
    Blank,
    Unrecognized,
}

/// Classification of a line inside the call graph table.
#[derive(Debug, Clone, PartialEq)]
pub enum CallGraphLine {
    Spontaneous,
    Function(FunctionLine),
    Arc(ArcLine),
    Rule,
    Blank,
    Unrecognized,
}

/// Whitespace tokenizer that keeps the untokenized remainder around, since
/// function names may contain spaces.
#[derive(Debug, Clone, Copy)]
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line.trim() }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start();
        if s.is_empty() {
            return None;
        }
        let end = s.find(char::is_whitespace).unwrap_or(s.len());
        let (token, rest) = s.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn decimal(&mut self) -> Option<f64> {
        self.next_token().and_then(parse_decimal)
    }

    fn integer(&mut self) -> Option<u64> {
        self.next_token().and_then(parse_integer)
    }

    fn rest(&self) -> &'a str {
        self.rest.trim()
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `\d+\.\d+`
fn parse_decimal(token: &str) -> Option<f64> {
    let (int, frac) = token.split_once('.')?;
    if !is_digits(int) || !is_digits(frac) {
        return None;
    }
    token.parse().ok()
}

fn parse_integer(token: &str) -> Option<u64> {
    if !is_digits(token) {
        return None;
    }
    token.parse().ok()
}

/// `N/M`
fn parse_ratio(token: &str) -> Option<(u64, u64)> {
    let (calls, total) = token.split_once('/')?;
    Some((parse_integer(calls)?, parse_integer(total)?))
}

/// `N` or `N+M`
fn parse_called(token: &str) -> Option<(u64, u64)> {
    match token.split_once('+') {
        Some((calls, recursive)) => Some((parse_integer(calls)?, parse_integer(recursive)?)),
        None => Some((parse_integer(token)?, 0)),
    }
}

/// `[N]`
fn parse_index(token: &str) -> Option<u32> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    if !is_digits(inner) {
        return None;
    }
    inner.parse().ok()
}

/// Split `name [N]` into the name and gprof's index.
fn split_name_index(rest: &str) -> Option<(&str, u32)> {
    let open = rest.rfind('[')?;
    let index = parse_index(rest[open..].trim_end())?;
    let name = rest[..open].trim();
    if name.is_empty() {
        return None;
    }
    Some((name, index))
}

/// Drop the `<cycle N>` tag gprof appends to members of a recursion cycle,
/// so the name matches the flat profile. `<cycle N as a whole>` pseudo
/// functions keep their full name.
pub fn strip_cycle_tag(name: &str) -> &str {
    if name.ends_with("as a whole>") {
        return name;
    }
    match name.rfind(" <cycle ") {
        Some(pos) if name.ends_with('>') => name[..pos].trim_end(),
        _ => name,
    }
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// A `-----` separator closing one call graph entry.
pub fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.bytes().all(|b| b == b'-')
}

pub fn is_spontaneous(line: &str) -> bool {
    line.trim() == "<spontaneous>"
}

/// The column header line of the flat profile.
pub fn is_flat_header(line: &str) -> bool {
    let mut fields = Fields::new(line);
    ["time", "seconds", "seconds"]
        .iter()
        .all(|expected| fields.next_token() == Some(*expected))
}

/// The column header line of the call graph table.
pub fn is_call_graph_header(line: &str) -> bool {
    let mut fields = Fields::new(line);
    ["index", "%", "time", "self", "children", "called"]
        .iter()
        .all(|expected| fields.next_token() == Some(*expected))
}

/// Total run time from the call graph preamble:
/// `granularity: each sample hit covers 2 byte(s) for 0.20% of 5.00 seconds`
pub fn parse_granularity(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("granularity:")?;
    let (_, after) = rest.split_once("% of ")?;
    let mut fields = Fields::new(after);
    let seconds = fields.decimal()?;
    (fields.next_token() == Some("seconds")).then_some(seconds)
}

/// `pct cumulative self calls self-ms/call total-ms/call name`
pub fn parse_flat_full(line: &str) -> Option<FlatEntry> {
    let mut fields = Fields::new(line);
    let time_pct = fields.decimal()?;
    let cumulative_secs = fields.decimal()?;
    let self_secs = fields.decimal()?;
    let calls = fields.integer()?;
    let self_ms_per_call = fields.decimal()?;
    let total_ms_per_call = fields.decimal()?;
    let name = fields.rest();
    if name.is_empty() {
        return None;
    }
    Some(FlatEntry {
        time_pct,
        cumulative_secs,
        self_secs,
        calls: Some(calls),
        self_ms_per_call: Some(self_ms_per_call),
        total_ms_per_call: Some(total_ms_per_call),
        name: name.to_string(),
    })
}

/// `pct cumulative self name`, used when gprof blanks the call columns.
pub fn parse_flat_short(line: &str) -> Option<FlatEntry> {
    let mut fields = Fields::new(line);
    let time_pct = fields.decimal()?;
    let cumulative_secs = fields.decimal()?;
    let self_secs = fields.decimal()?;
    let name = fields.rest();
    if name.is_empty() {
        return None;
    }
    Some(FlatEntry {
        time_pct,
        cumulative_secs,
        self_secs,
        calls: None,
        self_ms_per_call: None,
        total_ms_per_call: None,
        name: name.to_string(),
    })
}

/// `self children calls/total name [index]`
pub fn parse_arc_full(line: &str) -> Option<ArcLine> {
    let mut fields = Fields::new(line);
    let self_secs = fields.decimal()?;
    let child_secs = fields.decimal()?;
    let (calls, total) = fields.next_token().and_then(parse_ratio)?;
    let (name, index) = split_name_index(fields.rest())?;
    Some(ArcLine {
        self_secs: Some(self_secs),
        child_secs: Some(child_secs),
        calls,
        total_calls: Some(total),
        name: strip_cycle_tag(name).to_string(),
        index,
    })
}

/// `calls name [index]`, seen for recursive calls and cycle members.
pub fn parse_arc_count_only(line: &str) -> Option<ArcLine> {
    let mut fields = Fields::new(line);
    let token = fields.next_token()?;
    let (calls, total_calls) = match parse_ratio(token) {
        Some((calls, total)) => (calls, Some(total)),
        None => (parse_integer(token)?, None),
    };
    let (name, index) = split_name_index(fields.rest())?;
    Some(ArcLine {
        self_secs: None,
        child_secs: None,
        calls,
        total_calls,
        name: strip_cycle_tag(name).to_string(),
        index,
    })
}

/// Caller and callee lines share one shape.
pub fn parse_arc_line(line: &str) -> Option<ArcLine> {
    parse_arc_full(line).or_else(|| parse_arc_count_only(line))
}

/// Numeric columns of a function line, plus the fields left for the name.
type FunctionColumns<'a> = (Option<f64>, f64, f64, Option<u64>, u64, Fields<'a>);
type ColumnShape = for<'a> fn(Fields<'a>) -> Option<FunctionColumns<'a>>;

/// `pct self children called`
fn full_columns(mut fields: Fields<'_>) -> Option<FunctionColumns<'_>> {
    let time_pct = fields.decimal()?;
    let self_secs = fields.decimal()?;
    let child_secs = fields.decimal()?;
    let (calls, recursive) = fields.next_token().and_then(parse_called)?;
    Some((Some(time_pct), self_secs, child_secs, Some(calls), recursive, fields))
}

/// `pct self children`
fn uncalled_columns(mut fields: Fields<'_>) -> Option<FunctionColumns<'_>> {
    let time_pct = fields.decimal()?;
    let self_secs = fields.decimal()?;
    let child_secs = fields.decimal()?;
    Some((Some(time_pct), self_secs, child_secs, None, 0, fields))
}

/// `self children`
fn bare_columns(mut fields: Fields<'_>) -> Option<FunctionColumns<'_>> {
    let self_secs = fields.decimal()?;
    let child_secs = fields.decimal()?;
    Some((None, self_secs, child_secs, None, 0, fields))
}

/// `[index] pct self children called name [index]` and its reduced variants.
pub fn parse_function_line(line: &str) -> Option<FunctionLine> {
    let mut head = Fields::new(line);
    let index = head.next_token().and_then(parse_index)?;

    [full_columns as ColumnShape, uncalled_columns, bare_columns]
        .into_iter()
        .find_map(|shape| {
            let (time_pct, self_secs, child_secs, calls, recursive_calls, fields) = shape(head)?;
            let rest = fields.rest();
            let name = match split_name_index(rest) {
                Some((name, _)) => name,
                None if !rest.is_empty() => rest,
                None => return None,
            };
            Some(FunctionLine {
                index,
                time_pct,
                self_secs,
                child_secs,
                calls,
                recursive_calls,
                name: strip_cycle_tag(name).to_string(),
            })
        })
}

/// Classify a line found inside the flat profile, full shape first.
pub fn classify_flat_line(line: &str) -> FlatLine {
    if is_blank(line) {
        return FlatLine::Blank;
    }
    parse_flat_full(line)
        .or_else(|| parse_flat_short(line))
        .map_or(FlatLine::Unrecognized, FlatLine::Entry)
}

/// Classify a line found inside the call graph table.
pub fn classify_call_graph_line(line: &str) -> CallGraphLine {
    if is_blank(line) {
        return CallGraphLine::Blank;
    }
    if is_rule(line) {
        return CallGraphLine::Rule;
    }
    if is_spontaneous(line) {
        return CallGraphLine::Spontaneous;
    }
    if line.trim_start().starts_with('[') {
        return parse_function_line(line).map_or(CallGraphLine::Unrecognized, CallGraphLine::Function);
    }
    parse_arc_line(line).map_or(CallGraphLine::Unrecognized, CallGraphLine::Arc)
}
