//! Filter-graph model and the overlay graph compiler.
//!
//! A [`FilterGraph`] is an ordered list of [`GraphNode`]s. Each node reads
//! stream labels produced by earlier nodes (or raw input streams), runs a
//! chain of [`Filter`]s and produces new labels. The graph is rendered to
//! FFmpeg `-filter_complex` text only at the process boundary, and option
//! values are quoted there, never by callers.

use std::collections::HashSet;
use std::fmt;

use crate::error::{MediaError, MediaResult};
use crate::schedule::Schedule;

/// Overlay windows stop this far short of `start + insert_len` so that
/// back-to-back overlays never share a frame.
pub const OVERLAY_WINDOW_EPSILON_SECS: f64 = 0.01;

/// Input index of the primary clip.
pub const PRIMARY_INPUT: usize = 0;

/// Elementary stream type of a raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// A stream reference inside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamLabel {
    /// Raw stream of the N-th input file
    Input { index: usize, kind: StreamKind },
    /// Stream produced by a graph node
    Named(String),
}

impl StreamLabel {
    pub fn input_video(index: usize) -> Self {
        Self::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    pub fn input_audio(index: usize) -> Self {
        Self::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Stream specifier for `-map`.
    pub fn map_spec(&self) -> String {
        match self {
            StreamLabel::Input { index, kind } => format!("{}:{}", index, kind_suffix(*kind)),
            StreamLabel::Named(name) => format!("[{}]", name),
        }
    }
}

fn kind_suffix(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Video => "v",
        StreamKind::Audio => "a",
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLabel::Input { index, kind } => write!(f, "[{}:{}]", index, kind_suffix(*kind)),
            StreamLabel::Named(name) => write!(f, "[{}]", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterOption {
    Positional(String),
    Named(String, String),
}

/// A single FFmpeg filter with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    options: Vec<FilterOption>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Append a positional option.
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.options.push(FilterOption::Positional(value.to_string()));
        self
    }

    /// Append a `key=value` option.
    pub fn opt(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options
            .push(FilterOption::Named(key.into(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a named option, as given (unescaped).
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.iter().find_map(|o| match o {
            FilterOption::Named(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    fn render(&self) -> String {
        if self.options.is_empty() {
            return self.name.clone();
        }
        let options: Vec<String> = self
            .options
            .iter()
            .map(|o| match o {
                FilterOption::Positional(v) => escape_value(v),
                FilterOption::Named(k, v) => format!("{}={}", k, escape_value(v)),
            })
            .collect();
        format!("{}={}", self.name, options.join(":"))
    }
}

/// Quote an option value when it contains filter-graph metacharacters.
fn escape_value(value: &str) -> String {
    const SPECIAL: &[char] = &[':', ',', ';', '[', ']', '\'', '\\'];
    if !value.contains(SPECIAL) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Showcase track a schedule slot is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    A,
    B,
}

impl Track {
    /// Slots alternate A, B, A, B, ... by index parity.
    pub fn for_slot(index: usize) -> Self {
        if index % 2 == 0 {
            Track::A
        } else {
            Track::B
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Track::A => "a",
            Track::B => "b",
        }
    }
}

/// Role of a node in the compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Primary stream scaled to the output geometry
    Base,
    /// Single showcase source split for both tracks
    SourceSplit,
    /// Showcase stream scaled, trimmed and faded
    Prepare(Track),
    /// Prepared stream copied once per slot
    Duplicate(Track),
    /// Copy moved onto the primary timeline
    Shift,
    /// Composite of one showcase copy onto the running video
    Overlay,
}

/// One node of the filter graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub inputs: Vec<StreamLabel>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<StreamLabel>,
}

impl GraphNode {
    fn render(&self) -> String {
        let inputs: String = self.inputs.iter().map(ToString::to_string).collect();
        let chain: Vec<String> = self.filters.iter().map(Filter::render).collect();
        let outputs: String = self.outputs.iter().map(ToString::to_string).collect();
        format!("{}{}{}", inputs, chain.join(","), outputs)
    }

    /// First filter with the given name.
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name() == name)
    }
}

/// Compiled filter graph with its two terminal labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<GraphNode>,
    terminal_video: StreamLabel,
    terminal_audio: StreamLabel,
}

impl FilterGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn terminal_video(&self) -> &StreamLabel {
        &self.terminal_video
    }

    pub fn terminal_audio(&self) -> &StreamLabel {
        &self.terminal_audio
    }

    /// Overlay nodes in chain order.
    pub fn overlay_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Overlay)
    }

    /// Render as `-filter_complex` text.
    pub fn to_filter_complex(&self) -> String {
        self.nodes
            .iter()
            .map(GraphNode::render)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Check label wiring: every named input was produced by an earlier node
    /// and is consumed once, and only the terminal video label is left over.
    pub fn validate(&self) -> MediaResult<()> {
        let mut available: HashSet<&str> = HashSet::new();

        for node in &self.nodes {
            for input in &node.inputs {
                if let StreamLabel::Named(name) = input {
                    if !available.remove(name.as_str()) {
                        return Err(MediaError::internal(format!(
                            "filter graph label [{}] is not available",
                            name
                        )));
                    }
                }
            }
            for output in &node.outputs {
                if let StreamLabel::Named(name) = output {
                    if !available.insert(name.as_str()) {
                        return Err(MediaError::internal(format!(
                            "filter graph label [{}] produced twice",
                            name
                        )));
                    }
                }
            }
        }

        if let StreamLabel::Named(name) = &self.terminal_video {
            if !available.remove(name.as_str()) {
                return Err(MediaError::internal(format!(
                    "terminal video label [{}] is not produced",
                    name
                )));
            }
        }
        if let Some(dangling) = available.into_iter().next() {
            return Err(MediaError::internal(format!(
                "filter graph label [{}] is never consumed",
                dangling
            )));
        }
        Ok(())
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// Timing and geometry inputs of the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphParams {
    pub fade_secs: f64,
    pub insert_len: f64,
    pub geometry: Geometry,
    pub frame_rate: f64,
    /// Distinct showcase sources, 1 or 2
    pub source_count: usize,
}

fn fit_filters(geometry: Geometry, frame_rate: f64) -> Vec<Filter> {
    vec![
        Filter::new("scale")
            .arg(geometry.width)
            .arg(geometry.height)
            .opt("force_original_aspect_ratio", "decrease"),
        Filter::new("pad")
            .arg(geometry.width)
            .arg(geometry.height)
            .arg("(ow-iw)/2")
            .arg("(oh-ih)/2"),
        Filter::new("setsar").arg(1),
        Filter::new("fps").arg(frame_rate),
    ]
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Compile a schedule into the overlay filter graph.
///
/// Input 0 is the primary clip, input 1 showcase track A and, when two
/// sources are given, input 2 track B. A single source feeds both tracks.
/// Tracks the schedule never uses are not emitted.
pub fn compile_graph(schedule: &Schedule, params: &GraphParams) -> FilterGraph {
    let mut nodes = Vec::new();
    let base = StreamLabel::named("base");

    let mut base_filters = fit_filters(params.geometry, params.frame_rate);
    base_filters.push(Filter::new("format").arg("yuv420p"));
    nodes.push(GraphNode {
        kind: NodeKind::Base,
        inputs: vec![StreamLabel::input_video(PRIMARY_INPUT)],
        filters: base_filters,
        outputs: vec![base.clone()],
    });

    let slots = schedule.len();
    let uses_b = slots > 1;

    // Raw source for each used track.
    let (source_a, source_b) = if params.source_count >= 2 {
        (StreamLabel::input_video(1), StreamLabel::input_video(2))
    } else if uses_b {
        let a = StreamLabel::named("src_a");
        let b = StreamLabel::named("src_b");
        nodes.push(GraphNode {
            kind: NodeKind::SourceSplit,
            inputs: vec![StreamLabel::input_video(1)],
            filters: vec![Filter::new("split").arg(2)],
            outputs: vec![a.clone(), b.clone()],
        });
        (a, b)
    } else {
        (StreamLabel::input_video(1), StreamLabel::input_video(1))
    };

    let count_a = slots.div_ceil(2);
    let count_b = slots / 2;

    let copies_a = prepare_track(&mut nodes, Track::A, source_a, count_a, params);
    let copies_b = prepare_track(&mut nodes, Track::B, source_b, count_b, params);

    let mut copies_a = copies_a.into_iter();
    let mut copies_b = copies_b.into_iter();
    let mut current = base;

    for (i, start) in schedule.iter().enumerate() {
        let copy = match Track::for_slot(i) {
            Track::A => copies_a.next(),
            Track::B => copies_b.next(),
        };
        // Copy counts are derived from the slot count, so this never runs dry.
        let Some(copy) = copy else { break };

        let shifted = StreamLabel::named(format!("shift{}", i));
        nodes.push(GraphNode {
            kind: NodeKind::Shift,
            inputs: vec![copy],
            filters: vec![Filter::new("setpts").arg(format!("PTS+{}/TB", secs(start)))],
            outputs: vec![shifted.clone()],
        });

        let end = start + params.insert_len - OVERLAY_WINDOW_EPSILON_SECS;
        let output = if i + 1 == slots {
            StreamLabel::named("vout")
        } else {
            StreamLabel::named(format!("ov{}", i))
        };
        nodes.push(GraphNode {
            kind: NodeKind::Overlay,
            inputs: vec![current, shifted],
            filters: vec![Filter::new("overlay")
                .opt("x", "(W-w)/2")
                .opt("y", "(H-h)/2")
                .opt("eof_action", "pass")
                .opt("enable", format!("between(t,{},{})", secs(start), secs(end)))],
            outputs: vec![output.clone()],
        });
        current = output;
    }

    FilterGraph {
        nodes,
        terminal_video: current,
        terminal_audio: StreamLabel::input_audio(PRIMARY_INPUT),
    }
}

/// Emit the prepare node for a track and, when needed, its duplicate node.
/// Returns one label per slot assigned to the track.
fn prepare_track(
    nodes: &mut Vec<GraphNode>,
    track: Track,
    source: StreamLabel,
    copies: usize,
    params: &GraphParams,
) -> Vec<StreamLabel> {
    if copies == 0 {
        return Vec::new();
    }

    let prepared = StreamLabel::named(format!("prep_{}", track.tag()));
    let mut filters = fit_filters(params.geometry, params.frame_rate);
    filters.push(Filter::new("trim").opt("duration", secs(params.insert_len)));
    filters.push(Filter::new("setpts").arg("PTS-STARTPTS"));
    filters.push(Filter::new("format").arg("yuva420p"));
    if params.fade_secs > 0.0 {
        filters.push(
            Filter::new("fade")
                .opt("t", "in")
                .opt("st", secs(0.0))
                .opt("d", secs(params.fade_secs))
                .opt("alpha", 1),
        );
        filters.push(
            Filter::new("fade")
                .opt("t", "out")
                .opt("st", secs(params.insert_len - params.fade_secs))
                .opt("d", secs(params.fade_secs))
                .opt("alpha", 1),
        );
    }
    nodes.push(GraphNode {
        kind: NodeKind::Prepare(track),
        inputs: vec![source],
        filters,
        outputs: vec![prepared.clone()],
    });

    if copies == 1 {
        return vec![prepared];
    }

    let outputs: Vec<StreamLabel> = (0..copies)
        .map(|n| StreamLabel::named(format!("prep_{}{}", track.tag(), n)))
        .collect();
    nodes.push(GraphNode {
        kind: NodeKind::Duplicate(track),
        inputs: vec![prepared],
        filters: vec![Filter::new("split").arg(copies)],
        outputs: outputs.clone(),
    });
    outputs
}
