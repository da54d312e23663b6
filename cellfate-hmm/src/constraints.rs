//! Constraint specification loader
//!
//! Parses the declarative TOML document describing the hidden states, the
//! classifier labels each state may emit and the biologically permitted
//! transitions, and converts it into a validated [`ConstraintSet`].
//!
//! Self-loops are permitted for every state without being listed.

use crate::types::{HmmError, Label, Result, StateKind};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Raw document as written on disk
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConstraintDocument {
    n_states: usize,
    n_symbols: usize,
    #[serde(default)]
    start_states: Option<Vec<usize>>,
    #[serde(default, rename = "state")]
    states: Vec<StateEntry>,
    #[serde(default, rename = "transition")]
    transitions: Vec<TransitionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateEntry {
    id: usize,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: StateKind,
    #[serde(default)]
    stable: bool,
    #[serde(default)]
    event_terminal: bool,
    #[serde(default)]
    symbols: Vec<Label>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransitionEntry {
    from: usize,
    to: usize,
    #[serde(default)]
    class: Option<EdgeClass>,
    #[serde(default)]
    weight: Option<f64>,
}

/// Edge class of a permitted transition
///
/// Unclassified edges are classified by position in the state order when
/// the transition matrix is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeClass {
    /// State i to state i+1
    Forward,
    /// State i to state i-1
    Backward,
    /// Any jump further than one state
    Skip,
    /// From the end of an event back into a stable state
    Return,
}

/// One hidden state definition
#[derive(Debug, Clone, PartialEq)]
pub struct StateDefinition {
    /// One-based state id
    pub id: usize,
    /// Human readable name (defaults to "state_<id>")
    pub name: String,
    /// Biological stage, used for fate classification
    pub kind: StateKind,
    /// Baseline state with a strongly dominant self-loop
    pub stable: bool,
    /// Last state of an event, may return directly into a stable state
    pub event_terminal: bool,
    /// Classifier labels this state may emit (one-based, sorted)
    pub symbols: Vec<Label>,
}

/// A permitted transition between two states (zero-based indices)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRule {
    pub from: usize,
    pub to: usize,
    pub class: Option<EdgeClass>,
    pub weight_hint: Option<f64>,
}

/// Validated, immutable constraint set
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    n_symbols: usize,
    states: Vec<StateDefinition>,
    start_states: Option<BTreeSet<usize>>,
    transitions: BTreeMap<(usize, usize), TransitionRule>,
}

impl ConstraintSet {
    /// Number of hidden states (N)
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Number of observation symbols (M)
    pub fn n_symbols(&self) -> usize {
        self.n_symbols
    }

    /// State definitions ordered by id
    pub fn states(&self) -> &[StateDefinition] {
        &self.states
    }

    /// Ordered one-based state ids
    pub fn state_ids(&self) -> Vec<usize> {
        self.states.iter().map(|s| s.id).collect()
    }

    /// Zero-based indices of the states allowed to start a track, or `None`
    /// when every state may start one
    pub fn start_states(&self) -> Option<&BTreeSet<usize>> {
        self.start_states.as_ref()
    }

    /// Whether a transition between two zero-based states is permitted
    pub fn permits(&self, from: usize, to: usize) -> bool {
        (from == to && from < self.states.len()) || self.transitions.contains_key(&(from, to))
    }

    /// The explicit rule for a transition, if one was listed
    pub fn rule(&self, from: usize, to: usize) -> Option<&TransitionRule> {
        self.transitions.get(&(from, to))
    }

    /// All listed transition rules ordered by (from, to)
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRule> {
        self.transitions.values()
    }

    /// Whether a zero-based state may emit a zero-based symbol
    pub fn permits_emission(&self, state: usize, symbol: usize) -> bool {
        self.states
            .get(state)
            .map(|s| s.symbols.iter().any(|&l| l as usize == symbol + 1))
            .unwrap_or(false)
    }

    /// Kinds of all states, indexed by zero-based state
    pub fn kinds(&self) -> Vec<StateKind> {
        self.states.iter().map(|s| s.kind).collect()
    }
}

/// Load a constraint specification from a TOML file
pub fn load_constraints(path: &Path) -> Result<ConstraintSet> {
    log::info!("Loading constraint specification: {:?}", path);

    let content = std::fs::read_to_string(path).map_err(|e| {
        HmmError::malformed(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let set = load_from_str(&content)
        .map_err(|e| HmmError::malformed(format!("{:?}: {}", path, strip_prefix(&e))))?;

    log::info!(
        "Loaded {} states, {} symbols, {} transitions from {:?}",
        set.n_states(),
        set.n_symbols(),
        set.transitions.len(),
        path
    );
    Ok(set)
}

fn strip_prefix(err: &HmmError) -> String {
    match err {
        HmmError::MalformedConstraint(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Parse and validate a constraint specification held in memory
pub fn load_from_str(content: &str) -> Result<ConstraintSet> {
    let doc: ConstraintDocument = toml::from_str(content)
        .map_err(|e| HmmError::malformed(format!("invalid document: {}", e)))?;
    validate(doc)
}

fn validate(doc: ConstraintDocument) -> Result<ConstraintSet> {
    if doc.n_states == 0 {
        return Err(HmmError::malformed("n_states must be at least 1"));
    }
    if doc.n_symbols == 0 {
        return Err(HmmError::malformed("n_symbols must be at least 1"));
    }
    if doc.states.len() != doc.n_states {
        return Err(HmmError::malformed(format!(
            "n_states is {} but {} states are defined",
            doc.n_states,
            doc.states.len()
        )));
    }

    // State ids must be exactly 1..=N
    let mut by_id: BTreeMap<usize, StateEntry> = BTreeMap::new();
    for entry in doc.states {
        if entry.id == 0 || entry.id > doc.n_states {
            return Err(HmmError::malformed(format!(
                "state id {} outside 1..={}",
                entry.id, doc.n_states
            )));
        }
        if by_id.contains_key(&entry.id) {
            return Err(HmmError::malformed(format!("duplicate state id {}", entry.id)));
        }
        by_id.insert(entry.id, entry);
    }

    let mut states = Vec::with_capacity(doc.n_states);
    for (id, entry) in by_id {
        let mut symbols = entry.symbols;
        symbols.sort_unstable();
        symbols.dedup();
        if let Some(&bad) = symbols.iter().find(|&&l| l == 0 || l as usize > doc.n_symbols) {
            return Err(HmmError::malformed(format!(
                "state {} emits label {} outside 1..={}",
                id, bad, doc.n_symbols
            )));
        }
        states.push(StateDefinition {
            id,
            name: entry.name.unwrap_or_else(|| format!("state_{}", id)),
            kind: entry.kind,
            stable: entry.stable,
            event_terminal: entry.event_terminal,
            symbols,
        });
    }

    let check_state = |id: usize, ctx: &str| -> Result<usize> {
        if id == 0 || id > doc.n_states {
            Err(HmmError::malformed(format!(
                "{} references undefined state {}",
                ctx, id
            )))
        } else {
            Ok(id - 1)
        }
    };

    let mut transitions = BTreeMap::new();
    for t in doc.transitions {
        let ctx = format!("transition {}->{}", t.from, t.to);
        let from = check_state(t.from, &ctx)?;
        let to = check_state(t.to, &ctx)?;
        if let Some(w) = t.weight {
            if !w.is_finite() || w < 0.0 {
                return Err(HmmError::malformed(format!(
                    "{} has invalid weight {}",
                    ctx, w
                )));
            }
        }
        let rule = TransitionRule {
            from,
            to,
            class: t.class,
            weight_hint: t.weight,
        };
        if transitions.insert((from, to), rule).is_some() {
            return Err(HmmError::malformed(format!("{} listed twice", ctx)));
        }
    }

    let start_states = match doc.start_states {
        Some(ids) => {
            let mut set = BTreeSet::new();
            for id in ids {
                set.insert(check_state(id, "start_states")?);
            }
            Some(set)
        }
        None => None,
    };

    Ok(ConstraintSet {
        n_symbols: doc.n_symbols,
        states,
        start_states,
        transitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const THREE_STATES: &str = r#"
        n_states = 3
        n_symbols = 3
        start_states = [1]

        [[state]]
        id = 1
        name = "interphase"
        kind = "interphase"
        stable = true
        symbols = [1]

        [[state]]
        id = 2
        kind = "mitosis"
        symbols = [2, 3]

        [[state]]
        id = 3
        kind = "mitosis"
        event_terminal = true
        symbols = [3]

        [[transition]]
        from = 1
        to = 2

        [[transition]]
        from = 2
        to = 3
        weight = 0.5

        [[transition]]
        from = 3
        to = 1
        class = "return"
    "#;

    #[test]
    fn test_parse_valid_document() {
        let set = load_from_str(THREE_STATES).unwrap();
        assert_eq!(set.n_states(), 3);
        assert_eq!(set.n_symbols(), 3);
        assert_eq!(set.state_ids(), vec![1, 2, 3]);
        assert_eq!(set.states()[0].name, "interphase");
        assert_eq!(set.states()[1].name, "state_2");
        assert!(set.states()[0].stable);
        assert!(set.states()[2].event_terminal);

        assert!(set.permits(0, 1));
        assert!(set.permits(1, 1)); // implicit self-loop
        assert!(!set.permits(1, 0));
        assert_eq!(set.rule(1, 2).unwrap().weight_hint, Some(0.5));
        assert_eq!(set.rule(2, 0).unwrap().class, Some(EdgeClass::Return));

        assert!(set.permits_emission(1, 2));
        assert!(!set.permits_emission(0, 1));
        assert_eq!(set.start_states().unwrap().iter().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_undefined_state_in_transition() {
        let doc = r#"
            n_states = 1
            n_symbols = 1
            [[state]]
            id = 1
            symbols = [1]
            [[transition]]
            from = 1
            to = 4
        "#;
        let err = load_from_str(doc).unwrap_err();
        assert!(matches!(err, HmmError::MalformedConstraint(_)));
        assert!(err.to_string().contains("undefined state 4"));
    }

    #[test]
    fn test_rejects_bad_documents() {
        let cases = [
            "n_states = 2\nn_symbols = 1\n[[state]]\nid = 1\n",
            "n_states = 1\nn_symbols = 1\n[[state]]\nid = 2\n",
            "n_states = 1\nn_symbols = 2\n[[state]]\nid = 1\nsymbols = [3]\n",
            "n_states = 0\nn_symbols = 1\n",
            "n_states = 1\nn_symbols = 1\nstart_states = [9]\n[[state]]\nid = 1\n",
            "n_states = 1\nn_symbols = 1\n[[state]]\nid = 1\nflavour = \"x\"\n",
            "n_states = 1\nn_symbols = 1\n[[state]]\nid = 1\n[[transition]]\nfrom = 1\nto = 1\nweight = -1.0\n",
            "not toml at all [",
        ];
        for doc in cases {
            let err = load_from_str(doc).unwrap_err();
            assert!(
                matches!(err, HmmError::MalformedConstraint(_)),
                "expected malformed for {:?}, got {:?}",
                doc,
                err
            );
        }
    }

    #[test]
    fn test_duplicate_transition() {
        let doc = r#"
            n_states = 2
            n_symbols = 1
            [[state]]
            id = 1
            [[state]]
            id = 2
            [[transition]]
            from = 1
            to = 2
            [[transition]]
            from = 1
            to = 2
        "#;
        assert!(load_from_str(doc).unwrap_err().to_string().contains("listed twice"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(THREE_STATES.as_bytes()).unwrap();

        let set = load_constraints(file.path()).unwrap();
        assert_eq!(set.n_states(), 3);

        let missing = load_constraints(Path::new("/nonexistent/constraints.toml"));
        assert!(matches!(missing, Err(HmmError::MalformedConstraint(_))));
    }
}
