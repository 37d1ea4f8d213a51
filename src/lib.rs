//! Role-inheritance graph extraction for Casbin policy text.
//!
//! The crate turns the comma separated rule lines of a Casbin policy
//! (`p, alice, data1, read`, `g, alice, admin`, ...) into a relation graph
//! that an editor can render: typed relations, a role hierarchy built from
//! the `g`-family rules, relations bucketed by rule type and the list of
//! circular role-inheritance chains.
//!
//! # Overview
//!
//! Building a graph runs three stages over the same input:
//!
//!  - [`parse_relations`] turns text into an ordered list of [`PolicyRelation`]s.
//!    Malformed lines are skipped and reported as [`SkippedLine`]s, never as errors.
//!  - [`assemble_hierarchy`] deduplicates relation endpoints into [`PolicyNode`]s,
//!    classifies them with a [`NodeClassifier`] and nests children under their
//!    parent roles.
//!  - [`detect_cycles`] walks the role-inheritance edges and reports loops.
//!
//! [`GraphBuilder`] wires the stages together and carries the options,
//! [`parse_policy_graph`] runs it with the defaults.
//!
//! ```rust
//! use policy_graph::*;
//!
//! let graph = parse_policy_graph(
//!     "p, alice, data1, read\n\
//!      p, data2_admin, data2, write\n\
//!      g, alice, data2_admin",
//! );
//!
//! let admin = graph.find_node("data2_admin").unwrap();
//! assert_eq!(admin.node_type, NodeType::Role);
//! assert_eq!(admin.level, 0);
//! assert_eq!(admin.children[0].name, "alice");
//! assert_eq!(admin.children[0].level, 1);
//!
//! assert_eq!(graph.connections.get(RelationType::P).len(), 2);
//! assert!(!graph.has_cycles());
//! ```
//!
//! ## Cycles
//!
//! ```rust
//! # use policy_graph::*;
//! let graph = parse_policy_graph("g, a, b\ng, b, a");
//! assert_eq!(graph.cycles, vec![vec!["a".to_string(), "b".to_string()]]);
//! ```
//!
//! ## Highlighting
//!
//! [`tokenize_line`] splits a single line into spans for an editor. Only a
//! first field that is exactly `p`, `g`, `g2` or `g3` is a rule type keyword.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

const COMMENT_PREFIX: char = '#';
const FIELD_SEPARATOR: char = ',';
const CYCLE_LOG_TARGET: &str = "policy_graph::cycles";

/// Error returned when a textual token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTokenError {
    kind: &'static str,
    token: String,
}

impl UnknownTokenError {
    fn new(kind: &'static str, token: &str) -> Self {
        Self {
            kind,
            token: token.to_string(),
        }
    }

    /// The kind of value that was being parsed, e.g. `"relation type"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The rejected input.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for UnknownTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.token)
    }
}

impl std::error::Error for UnknownTokenError {}

/// The rule type token that starts a policy line.
///
/// `p` lines grant permissions, `g`, `g2` and `g3` lines declare
/// role inheritance at increasing grouping levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    P,
    G,
    G2,
    G3,
}

impl RelationType {
    /// Every relation type, in bucket order.
    pub const ALL: [RelationType; 4] = [
        RelationType::P,
        RelationType::G,
        RelationType::G2,
        RelationType::G3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::P => "p",
            RelationType::G => "g",
            RelationType::G2 => "g2",
            RelationType::G3 => "g3",
        }
    }

    /// Matches a rule type token exactly. `P`, `g10` or `guest` are not rule types.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "p" => Some(RelationType::P),
            "g" => Some(RelationType::G),
            "g2" => Some(RelationType::G2),
            "g3" => Some(RelationType::G3),
            _ => None,
        }
    }

    /// Whether relations of this type contribute parent/child edges.
    pub fn is_role_inheritance(&self) -> bool {
        !matches!(self, RelationType::P)
    }

    /// Minimum number of fields on a line of this type, counting the type token.
    pub fn min_fields(&self) -> usize {
        match self {
            RelationType::P => 4,
            _ => 3,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownTokenError::new("relation type", s))
    }
}

/// The effect carried by a `p` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }

    /// Matches `allow` or `deny` exactly.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "allow" => Some(Effect::Allow),
            "deny" => Some(Effect::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownTokenError::new("effect", s))
    }
}

/// An edge extracted from one policy line.
///
/// For `g`-family relations `source` inherits from `target`, so
/// `g, alice, admin` reads as "alice is a member of admin".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    /// Only set on `p` relations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Only set on `p` relations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
}

impl PolicyRelation {
    pub fn new(
        relation_type: RelationType,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type,
            action: None,
            domain: None,
            effect: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Why a non-blank line produced no relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipReason {
    /// The first field is not `p`, `g`, `g2` or `g3`.
    UnknownRuleType { token: String },
    /// Fewer fields than the rule type requires. Counts exclude the type token.
    MissingFields {
        #[serde(rename = "ruleType")]
        rule_type: RelationType,
        expected: usize,
        found: usize,
    },
    /// A required field is blank. `position` is 1-based, after the type token.
    EmptyField {
        #[serde(rename = "ruleType")]
        rule_type: RelationType,
        position: usize,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownRuleType { token } => write!(f, "unknown rule type `{}`", token),
            SkipReason::MissingFields {
                rule_type,
                expected,
                found,
            } => write!(
                f,
                "`{}` rule needs {} fields, found {}",
                rule_type, expected, found
            ),
            SkipReason::EmptyField {
                rule_type,
                position,
            } => write!(f, "`{}` rule has an empty field at {}", rule_type, position),
        }
    }
}

/// A line the parser dropped, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// The output of the rule parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPolicy {
    /// Relations in input line order.
    pub relations: Vec<PolicyRelation>,
    pub skipped: Vec<SkippedLine>,
}

/// Parses policy text with the default options.
///
/// Blank lines and `#` comments are ignored. Every other line either yields a
/// relation or a [`SkippedLine`]; parsing never fails.
///
/// ```rust
/// # use policy_graph::*;
/// let parsed = parse_relations("p, alice, data1, read, deny\np, onlyTwoFields");
/// assert_eq!(parsed.relations.len(), 1);
/// assert_eq!(parsed.relations[0].effect, Some(Effect::Deny));
/// assert_eq!(parsed.skipped[0].line, 2);
/// ```
pub fn parse_relations(text: &str) -> ParsedPolicy {
    parse_text(text, true)
}

fn parse_text(text: &str, extract_effect: bool) -> ParsedPolicy {
    let mut parsed = ParsedPolicy::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            continue;
        }

        match parse_line(line, extract_effect) {
            Ok(relation) => parsed.relations.push(relation),
            Err(reason) => {
                tracing::debug!(line = index + 1, %reason, "Skipping policy line");
                parsed.skipped.push(SkippedLine {
                    line: index + 1,
                    reason,
                });
            }
        }
    }

    parsed
}

fn parse_line(line: &str, extract_effect: bool) -> Result<PolicyRelation, SkipReason> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    let rule_type =
        RelationType::from_token(fields[0]).ok_or_else(|| SkipReason::UnknownRuleType {
            token: fields[0].to_string(),
        })?;

    let min_fields = rule_type.min_fields();
    if fields.len() < min_fields {
        return Err(SkipReason::MissingFields {
            rule_type,
            expected: min_fields - 1,
            found: fields.len() - 1,
        });
    }
    if let Some(blank) = fields[1..min_fields].iter().position(|f| f.is_empty()) {
        return Err(SkipReason::EmptyField {
            rule_type,
            position: blank + 1,
        });
    }

    let mut relation = PolicyRelation::new(rule_type, fields[1], fields[2]);
    if rule_type == RelationType::P {
        relation.action = Some(fields[3].to_string());
    }

    for field in fields[min_fields..].iter().filter(|f| !f.is_empty()) {
        match Effect::from_token(field) {
            Some(effect) if extract_effect && rule_type == RelationType::P => {
                relation.effect.get_or_insert(effect);
            }
            _ => {
                if relation.domain.is_none() {
                    relation.domain = Some(field.to_string());
                }
            }
        }
    }

    Ok(relation)
}

/// The highlighting class of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A first field that is exactly `p`, `g`, `g2` or `g3`.
    RuleType,
    Field,
    /// A trailing `allow` or `deny` on a `p` line.
    Effect,
    Separator,
    Comment,
}

/// A span of a policy line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte range into the tokenized line.
    pub span: Range<usize>,
}

/// Splits one policy line into highlighting tokens.
///
/// Whitespace around fields is not part of any token and empty fields produce
/// no token. A line whose first non-blank character is `#` is a single comment.
///
/// ```rust
/// # use policy_graph::*;
/// let kinds: Vec<_> = tokenize_line("p, password, data1, read")
///     .into_iter()
///     .filter(|t| t.kind != TokenKind::Separator)
///     .map(|t| t.kind)
///     .collect();
/// assert_eq!(
///     kinds,
///     vec![TokenKind::RuleType, TokenKind::Field, TokenKind::Field, TokenKind::Field]
/// );
/// assert_eq!(tokenize_line("password, x")[0].kind, TokenKind::Field);
/// ```
pub fn tokenize_line(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();

    let start = line.len() - line.trim_start().len();
    if line[start..].starts_with(COMMENT_PREFIX) {
        let end = line.trim_end().len();
        tokens.push(Token {
            kind: TokenKind::Comment,
            text: &line[start..end],
            span: start..end,
        });
        return tokens;
    }

    let mut rule_type = None;
    let mut offset = 0;
    for (index, segment) in line.split(FIELD_SEPARATOR).enumerate() {
        if index > 0 {
            tokens.push(Token {
                kind: TokenKind::Separator,
                text: &line[offset - 1..offset],
                span: offset - 1..offset,
            });
        }

        let value = segment.trim();
        if !value.is_empty() {
            let start = offset + segment.len() - segment.trim_start().len();
            let end = start + value.len();
            let kind = if index == 0 {
                rule_type = RelationType::from_token(value);
                if rule_type.is_some() {
                    TokenKind::RuleType
                } else {
                    TokenKind::Field
                }
            } else if rule_type == Some(RelationType::P)
                && index >= RelationType::P.min_fields()
                && Effect::from_token(value).is_some()
            {
                TokenKind::Effect
            } else {
                TokenKind::Field
            };
            tokens.push(Token {
                kind,
                text: value,
                span: start..end,
            });
        }

        offset += segment.len() + FIELD_SEPARATOR.len_utf8();
    }

    tokens
}

/// The semantic class of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    User,
    Role,
    Resource,
    Object,
    Action,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::User => "user",
            NodeType::Role => "role",
            NodeType::Resource => "resource",
            NodeType::Object => "object",
            NodeType::Action => "action",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(NodeType::User),
            "role" => Ok(NodeType::Role),
            "resource" => Ok(NodeType::Resource),
            "object" => Ok(NodeType::Object),
            "action" => Ok(NodeType::Action),
            _ => Err(UnknownTokenError::new("node type", s)),
        }
    }
}

/// How a node name is used across all relations of one parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeUsage {
    /// Source or target of some `g2` relation.
    pub in_resource_group: bool,
    /// Equal to the action of some `p` relation.
    pub as_action: bool,
    /// Target of some `p` relation.
    pub as_policy_object: bool,
    pub as_source: bool,
    pub as_target: bool,
}

/// Assigns a [`NodeType`] to every node of a graph.
///
/// Closures taking `(&str, &NodeUsage)` implement this trait, which makes it
/// easy to override the classification for a known naming scheme.
pub trait NodeClassifier: Send + Sync {
    fn classify(&self, name: &str, usage: &NodeUsage) -> NodeType;
}

impl<F> NodeClassifier for F
where
    F: Fn(&str, &NodeUsage) -> NodeType + Send + Sync,
{
    fn classify(&self, name: &str, usage: &NodeUsage) -> NodeType {
        self(name, usage)
    }
}

/// The default classifier.
///
/// Checks in order: any `g2` participation is a resource, a `p` action value
/// is an action, a `p` target is an object, a name that is only ever a source
/// is a user, and everything else is a role.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl NodeClassifier for HeuristicClassifier {
    fn classify(&self, _name: &str, usage: &NodeUsage) -> NodeType {
        if usage.in_resource_group {
            NodeType::Resource
        } else if usage.as_action {
            NodeType::Action
        } else if usage.as_policy_object {
            NodeType::Object
        } else if usage.as_source && !usage.as_target {
            NodeType::User
        } else {
            NodeType::Role
        }
    }
}

/// A deduplicated graph vertex with its inherited members as children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub level: usize,
    /// Type of the first relation touching this node.
    pub policy_type: RelationType,
    pub children: Vec<PolicyNode>,
}

impl PolicyNode {
    /// Searches this node and its descendants, depth first.
    pub fn find(&self, name: &str) -> Option<&PolicyNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Formats the subtree with two spaces of indentation per level.
    pub fn format(&self, indent: usize) -> String {
        let mut result = format!(
            "{}{} [{}] level {}",
            " ".repeat(indent),
            self.name,
            self.node_type,
            self.level
        );
        for child in &self.children {
            result.push_str(&format!("\n{}", child.format(indent + 2)));
        }
        result
    }
}

struct NodeSlot<'a> {
    name: &'a str,
    node_type: NodeType,
    level: usize,
    policy_type: RelationType,
    children: Vec<usize>,
}

/// Node names in first-appearance order plus a name lookup.
struct NodeIndex<'a> {
    names: Vec<&'a str>,
    positions: HashMap<&'a str, usize>,
}

impl<'a> NodeIndex<'a> {
    fn from_relations(relations: &'a [PolicyRelation]) -> Self {
        let mut index = NodeIndex {
            names: Vec::new(),
            positions: HashMap::new(),
        };
        for relation in relations {
            index.insert(&relation.source);
            index.insert(&relation.target);
        }
        index
    }

    fn insert(&mut self, name: &'a str) -> usize {
        if let Some(&position) = self.positions.get(name) {
            return position;
        }
        let position = self.names.len();
        self.names.push(name);
        self.positions.insert(name, position);
        position
    }

    fn position(&self, name: &str) -> usize {
        self.positions[name]
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

fn node_usage(relations: &[PolicyRelation], index: &NodeIndex<'_>) -> Vec<NodeUsage> {
    let mut usage = vec![NodeUsage::default(); index.len()];
    let mut actions = HashSet::new();

    for relation in relations {
        let source = index.position(&relation.source);
        let target = index.position(&relation.target);
        usage[source].as_source = true;
        usage[target].as_target = true;

        match relation.relation_type {
            RelationType::G2 => {
                usage[source].in_resource_group = true;
                usage[target].in_resource_group = true;
            }
            RelationType::P => {
                usage[target].as_policy_object = true;
                if let Some(action) = &relation.action {
                    actions.insert(action.as_str());
                }
            }
            _ => {}
        }
    }

    for action in actions {
        if let Some(&position) = index.positions.get(action) {
            usage[position].as_action = true;
        }
    }

    usage
}

/// Builds the role hierarchy from a relation list.
///
/// Every `g`-family relation makes its target the parent of its source. A
/// child's level is its parent's level plus one at the time the edge is
/// inserted, so with several paths to a node the last edge wins. Roots are
/// the nodes that never appear as the source of a `g`-family relation; when
/// there are none, every node is returned at the top level.
///
/// A node's subtree is expanded only where the node is first reached; other
/// parents list it as a leaf. Children that would re-enter a node already on
/// the current branch are left out, so output stays linear in the number of
/// relations even for dense or cyclic input.
pub fn assemble_hierarchy(
    relations: &[PolicyRelation],
    classifier: &dyn NodeClassifier,
) -> Vec<PolicyNode> {
    let index = NodeIndex::from_relations(relations);
    let usage = node_usage(relations, &index);

    let mut slots: Vec<NodeSlot<'_>> = index
        .names
        .iter()
        .copied()
        .zip(&usage)
        .map(|(name, usage)| NodeSlot {
            name,
            node_type: classifier.classify(name, usage),
            level: 0,
            policy_type: RelationType::P,
            children: Vec::new(),
        })
        .collect();

    let mut typed = vec![false; slots.len()];
    let mut has_parent = vec![false; slots.len()];
    for relation in relations {
        let source = index.position(&relation.source);
        let target = index.position(&relation.target);
        for position in [source, target] {
            if !typed[position] {
                typed[position] = true;
                slots[position].policy_type = relation.relation_type;
            }
        }

        if !relation.relation_type.is_role_inheritance() {
            continue;
        }
        has_parent[source] = true;
        if !slots[target].children.contains(&source) {
            slots[target].children.push(source);
            slots[source].level = slots[target].level + 1;
        }
    }

    let mut roots: Vec<usize> = (0..slots.len()).filter(|&i| !has_parent[i]).collect();
    if roots.is_empty() {
        tracing::trace!(nodes = slots.len(), "No root nodes, returning flat node list");
        roots = (0..slots.len()).collect();
    }

    materialize(&roots, &slots)
}

/// Expands every node's subtree at most once per build, so output size is
/// bounded by roots plus edges. Later occurrences of an expanded node are
/// leaves, and children already on the current branch are left out.
fn materialize(roots: &[usize], slots: &[NodeSlot<'_>]) -> Vec<PolicyNode> {
    let to_node = |slot: &NodeSlot<'_>, children| PolicyNode {
        name: slot.name.to_string(),
        node_type: slot.node_type,
        level: slot.level,
        policy_type: slot.policy_type,
        children,
    };

    let mut emitted = vec![false; slots.len()];
    let mut on_branch = vec![false; slots.len()];
    let mut output = Vec::with_capacity(roots.len());

    for &root in roots {
        if emitted[root] {
            output.push(to_node(&slots[root], Vec::new()));
            continue;
        }

        emitted[root] = true;
        on_branch[root] = true;
        let mut stack: Vec<(usize, usize, Vec<PolicyNode>)> = vec![(root, 0, Vec::new())];
        while let Some((slot, cursor, mut children)) = stack.pop() {
            if let Some(&child) = slots[slot].children.get(cursor) {
                if !on_branch[child] && emitted[child] {
                    children.push(to_node(&slots[child], Vec::new()));
                }
                stack.push((slot, cursor + 1, children));
                if !emitted[child] {
                    emitted[child] = true;
                    on_branch[child] = true;
                    stack.push((child, 0, Vec::new()));
                }
                continue;
            }

            on_branch[slot] = false;
            let node = to_node(&slots[slot], children);
            match stack.last_mut() {
                Some((_, _, siblings)) => siblings.push(node),
                None => output.push(node),
            }
        }
    }

    output
}

/// Relations grouped by rule type, each group in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionsByType {
    pub p: Vec<PolicyRelation>,
    pub g: Vec<PolicyRelation>,
    pub g2: Vec<PolicyRelation>,
    pub g3: Vec<PolicyRelation>,
}

impl ConnectionsByType {
    pub fn from_relations(relations: &[PolicyRelation]) -> Self {
        let mut connections = Self::default();
        for relation in relations {
            connections
                .bucket_mut(relation.relation_type)
                .push(relation.clone());
        }
        connections
    }

    pub fn get(&self, relation_type: RelationType) -> &[PolicyRelation] {
        match relation_type {
            RelationType::P => &self.p,
            RelationType::G => &self.g,
            RelationType::G2 => &self.g2,
            RelationType::G3 => &self.g3,
        }
    }

    fn bucket_mut(&mut self, relation_type: RelationType) -> &mut Vec<PolicyRelation> {
        match relation_type {
            RelationType::P => &mut self.p,
            RelationType::G => &mut self.g,
            RelationType::G2 => &mut self.g2,
            RelationType::G3 => &mut self.g3,
        }
    }

    /// Iterates the buckets in `p, g, g2, g3` order.
    pub fn iter(&self) -> impl Iterator<Item = (RelationType, &[PolicyRelation])> + '_ {
        RelationType::ALL
            .into_iter()
            .map(move |relation_type| (relation_type, self.get(relation_type)))
    }

    pub fn len(&self) -> usize {
        self.p.len() + self.g.len() + self.g2.len() + self.g3.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shorthand for [`ConnectionsByType::from_relations`].
pub fn connections_by_type(relations: &[PolicyRelation]) -> ConnectionsByType {
    ConnectionsByType::from_relations(relations)
}

/// Controls how much of the graph each cycle-detection start may explore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleScan {
    /// Every node starts with a fresh visited set. Finds cycles that are only
    /// reachable through nodes explored from an earlier start. Each start
    /// walks everything reachable from it, so a long chain costs quadratic time.
    #[default]
    PerStart,
    /// One visited set for the whole pass. Each node is explored at most once,
    /// which can hide cycles depending on node order.
    Shared,
}

/// Finds role-inheritance loops.
///
/// A depth-first walk follows `g`-family edges from source to target, starting
/// once from every node in first-appearance order. Reaching a node that is
/// already on the walk records the path from that node to the current one.
/// Cycles over the same set of nodes are reported once.
///
/// ```rust
/// # use policy_graph::*;
/// let parsed = parse_relations("g, a, b\ng, b, c\ng, c, a\np, a, c, read");
/// let cycles = detect_cycles(&parsed.relations, CycleScan::PerStart);
/// assert_eq!(cycles, vec![vec!["a", "b", "c"]]);
/// ```
pub fn detect_cycles(relations: &[PolicyRelation], scan: CycleScan) -> Vec<Vec<String>> {
    let index = NodeIndex::from_relations(relations);
    let mut adjacency = vec![Vec::new(); index.len()];
    for relation in relations
        .iter()
        .filter(|r| r.relation_type.is_role_inheritance())
    {
        adjacency[index.position(&relation.source)].push(index.position(&relation.target));
    }

    // Holds the pass number that last visited each node; a new number per
    // start clears the set without touching it.
    let mut visited = vec![0usize; index.len()];
    let mut on_path = vec![false; index.len()];
    let mut reported: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles = Vec::new();

    for start in 0..index.len() {
        let pass = match scan {
            CycleScan::PerStart => start + 1,
            CycleScan::Shared => 1,
        };
        if visited[start] == pass {
            continue;
        }

        visited[start] = pass;
        on_path[start] = true;
        let mut stack = vec![(start, 0usize)];
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let next = adjacency[node].get(frame.1).copied();
            frame.1 += 1;

            let Some(next) = next else {
                stack.pop();
                on_path[node] = false;
                continue;
            };

            if on_path[next] {
                let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                let members: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                let mut key = members.clone();
                key.sort_unstable();
                if reported.insert(key) {
                    let cycle: Vec<String> =
                        members.iter().map(|&n| index.names[n].to_string()).collect();
                    tracing::debug!(
                        target: CYCLE_LOG_TARGET,
                        cycle = ?cycle,
                        length = cycle.len(),
                        "Circular role inheritance detected"
                    );
                    cycles.push(cycle);
                }
            } else if visited[next] != pass {
                visited[next] = pass;
                on_path[next] = true;
                stack.push((next, 0));
            }
        }
    }

    cycles
}

/// Everything an editor needs to draw one policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyGraph {
    pub relations: Vec<PolicyRelation>,
    /// Root nodes of the role hierarchy, or every node when no root exists.
    pub nodes: Vec<PolicyNode>,
    pub connections: ConnectionsByType,
    pub cycles: Vec<Vec<String>>,
    pub skipped: Vec<SkippedLine>,
}

impl PolicyGraph {
    /// True when no relation was parsed. Editors show an empty state for this.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Number of distinct node names.
    pub fn node_count(&self) -> usize {
        self.relations
            .iter()
            .flat_map(|r| [r.source.as_str(), r.target.as_str()])
            .collect::<HashSet<_>>()
            .len()
    }

    /// Finds the first node with the given name in the hierarchy.
    pub fn find_node(&self, name: &str) -> Option<&PolicyNode> {
        self.nodes.iter().find_map(|root| root.find(name))
    }

    /// Returns the hierarchy as indented text followed by the detected cycles.
    pub fn format(&self) -> String {
        if self.is_empty() {
            return "No policy relations".to_string();
        }

        let mut lines: Vec<String> = self.nodes.iter().map(|node| node.format(0)).collect();
        if self.has_cycles() {
            lines.push("Cycles:".to_string());
            for cycle in &self.cycles {
                let closing = cycle.first().map(String::as_str).unwrap_or_default();
                lines.push(format!("  {} -> {}", cycle.join(" -> "), closing));
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for PolicyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Configures and runs the parse, assemble and cycle-detection stages.
///
/// ```rust
/// # use policy_graph::*;
/// let builder = GraphBuilder::new()
///     .extract_effect(false)
///     .cycle_scan(CycleScan::Shared);
/// let graph = builder.build("p, alice, data1, read, deny");
/// assert_eq!(graph.relations[0].domain.as_deref(), Some("deny"));
/// assert_eq!(graph.relations[0].effect, None);
/// ```
pub struct GraphBuilder {
    extract_effect: bool,
    cycle_scan: CycleScan,
    classifier: Box<dyn NodeClassifier>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a builder with effect extraction on, [`CycleScan::PerStart`]
    /// and the [`HeuristicClassifier`].
    pub fn new() -> Self {
        Self {
            extract_effect: true,
            cycle_scan: CycleScan::default(),
            classifier: Box::new(HeuristicClassifier),
        }
    }

    /// Whether a trailing `allow`/`deny` on a `p` rule is read as its effect.
    /// When off, it is treated like any other trailing field.
    pub fn extract_effect(mut self, extract_effect: bool) -> Self {
        self.extract_effect = extract_effect;
        self
    }

    pub fn cycle_scan(mut self, cycle_scan: CycleScan) -> Self {
        self.cycle_scan = cycle_scan;
        self
    }

    /// Replaces the node classifier.
    pub fn classifier<C: NodeClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Runs only the rule parser.
    pub fn parse(&self, text: &str) -> ParsedPolicy {
        parse_text(text, self.extract_effect)
    }

    /// Builds the full graph. Each call starts from scratch.
    #[tracing::instrument(skip_all)]
    pub fn build(&self, text: &str) -> PolicyGraph {
        let ParsedPolicy { relations, skipped } = self.parse(text);
        let nodes = assemble_hierarchy(&relations, &*self.classifier);
        let connections = ConnectionsByType::from_relations(&relations);
        let cycles = detect_cycles(&relations, self.cycle_scan);

        if relations.is_empty() && !text.trim().is_empty() {
            tracing::debug!(skipped = skipped.len(), "Policy text produced no relations");
        }
        tracing::trace!(
            relations = relations.len(),
            roots = nodes.len(),
            cycles = cycles.len(),
            skipped = skipped.len(),
            "Built policy graph"
        );

        PolicyGraph {
            relations,
            nodes,
            connections,
            cycles,
            skipped,
        }
    }
}

/// Builds a graph with the default [`GraphBuilder`].
pub fn parse_policy_graph(text: &str) -> PolicyGraph {
    GraphBuilder::new().build(text)
}
