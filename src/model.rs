//! Feature models: an arena-allocated feature tree plus cross-tree constraints.
//!
//! Nodes live in a single arena owned by the [`FeatureModel`] and are addressed
//! by [`FeatureId`]. Parent links are plain indices, never owning edges.
//! Every structural edit validates its arguments before touching the arena,
//! so a failed edit leaves the tree exactly as it was.
//!
//! Cloning a model deep-copies the arena: ids of the clone address the clone
//! only, and edits on one never show up in the other.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::formula::Formula;

/// Index of a feature in its model's arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FeatureId(usize);

impl FeatureId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the children of a feature are combined.
///
/// - `And`: each child is selected according to its own mandatory flag.
/// - `Or`: at least one child is selected.
/// - `Alternative`: exactly one child is selected.
///
/// A leaf has no children, so its group kind has no semantic effect.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum GroupKind {
    #[default]
    And,
    Or,
    Alternative,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::And => write!(f, "and"),
            GroupKind::Or => write!(f, "or"),
            GroupKind::Alternative => write!(f, "alt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    name: String,
    element_id: u64,
    is_abstract: bool,
    hidden: bool,
    mandatory: bool,
    group: GroupKind,
    parent: Option<FeatureId>,
    children: Vec<FeatureId>,
    removed: bool,
}

impl Feature {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable numeric identity, unique within the model and kept by clones.
    pub fn element_id(&self) -> u64 {
        self.element_id
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Only meaningful when the parent has an `And` group.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn group(&self) -> GroupKind {
        self.group
    }

    pub fn parent(&self) -> Option<FeatureId> {
        self.parent
    }

    pub fn children(&self) -> &[FeatureId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Analysis verdict attached to a constraint.
///
/// Set by [`FeatureAnalyzer`][crate::analysis::FeatureAnalyzer], never by users.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ConstraintAttribute {
    #[default]
    Normal,
    Redundant,
    Tautology,
    Dead,
    FalseOptional,
    Unsatisfiable,
    VoidModel,
    Implicit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    formula: Formula,
    attribute: ConstraintAttribute,
    element_id: u64,
}

impl Constraint {
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn attribute(&self) -> ConstraintAttribute {
        self.attribute
    }

    pub fn element_id(&self) -> u64 {
        self.element_id
    }

    pub fn contained_features(&self) -> Vec<&str> {
        self.formula.contained_features()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureModel {
    features: Vec<Feature>,
    names: FxHashMap<String, FeatureId>,
    root: Option<FeatureId>,
    constraints: Vec<Constraint>,
    next_element_id: u64,
}

impl FeatureModel {
    pub fn new() -> Self {
        Self {
            next_element_id: 1,
            ..Default::default()
        }
    }

    /// Creates a model consisting of a single root feature.
    pub fn with_root(name: impl Into<String>) -> Result<(Self, FeatureId)> {
        let mut model = Self::new();
        let root = model.create_feature(name)?;
        model.set_root(Some(root))?;
        Ok((model, root))
    }

    /// Creates a detached feature owned by this model.
    ///
    /// The feature becomes part of the tree once added via [`add_child`](Self::add_child)
    /// or [`set_root`](Self::set_root).
    pub fn create_feature(&mut self, name: impl Into<String>) -> Result<FeatureId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        let id = FeatureId(self.features.len());
        self.features.push(Feature {
            name: name.clone(),
            element_id: self.next_element_id,
            is_abstract: false,
            hidden: false,
            mandatory: false,
            group: GroupKind::And,
            parent: None,
            children: Vec::new(),
            removed: false,
        });
        self.next_element_id += 1;
        self.names.insert(name, id);
        Ok(id)
    }

    /// Convenience: creates a feature and appends it to `parent`.
    pub fn add_feature(&mut self, parent: FeatureId, name: impl Into<String>, mandatory: bool) -> Result<FeatureId> {
        self.check_live(parent)?;
        let id = self.create_feature(name)?;
        self.features[id.0].mandatory = mandatory;
        self.add_child(parent, id)?;
        Ok(id)
    }

    pub fn root(&self) -> Option<FeatureId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<FeatureId>) -> Result<()> {
        if let Some(id) = root {
            self.check_live(id)?;
            if self.features[id.0].parent.is_some() {
                return Err(Error::InvalidStructure(format!(
                    "root {} must not have a parent",
                    self.features[id.0].name
                )));
            }
        }
        self.root = root;
        Ok(())
    }

    pub fn feature(&self, id: FeatureId) -> &Feature {
        &self.features[id.0]
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id.0).filter(|f| !f.removed)
    }

    pub fn name(&self, id: FeatureId) -> &str {
        &self.features[id.0].name
    }

    pub fn find(&self, name: &str) -> Option<FeatureId> {
        self.names.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn parent(&self, id: FeatureId) -> Option<FeatureId> {
        self.features[id.0].parent
    }

    pub fn children(&self, id: FeatureId) -> &[FeatureId] {
        &self.features[id.0].children
    }

    pub fn next_element_id(&self) -> u64 {
        self.next_element_id
    }

    /// Features reachable from the root, in pre-order.
    pub fn features(&self) -> Vec<FeatureId> {
        let mut result = Vec::new();
        let Some(root) = self.root else {
            return result;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.features[id.0].children.iter().rev());
        }
        result
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.features().into_iter().map(|id| self.name(id)).collect()
    }

    pub fn num_features(&self) -> usize {
        self.features().len()
    }

    /// Returns `true` if `ancestor` lies on the path from `id` to its tree root
    /// (a feature counts as its own ancestor).
    pub fn is_ancestor(&self, ancestor: FeatureId, id: FeatureId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.features[cur.0].parent;
        }
        false
    }

    /// Returns `true` if the feature or any of its ancestors is hidden.
    pub fn has_hidden_ancestor(&self, id: FeatureId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if self.features[cur.0].hidden {
                return true;
            }
            current = self.features[cur.0].parent;
        }
        false
    }

    fn check_live(&self, id: FeatureId) -> Result<()> {
        match self.features.get(id.0) {
            Some(feature) if !feature.removed => Ok(()),
            Some(feature) => Err(Error::InvalidStructure(format!("feature {} was removed", feature.name))),
            None => Err(Error::InvalidStructure(format!("no feature with id {}", id))),
        }
    }

    fn check_attachable(&self, parent: FeatureId, child: FeatureId) -> Result<()> {
        self.check_live(parent)?;
        self.check_live(child)?;
        let name = &self.features[child.0].name;
        if self.features[child.0].parent.is_some() {
            return Err(Error::InvalidStructure(format!("{} already has a parent", name)));
        }
        if self.root == Some(child) {
            return Err(Error::InvalidStructure(format!("{} is the root", name)));
        }
        if self.is_ancestor(child, parent) {
            return Err(Error::InvalidStructure(format!("adding {} would create a cycle", name)));
        }
        Ok(())
    }

    pub fn add_child(&mut self, parent: FeatureId, child: FeatureId) -> Result<()> {
        self.check_live(parent)?;
        let len = self.features[parent.0].children.len();
        self.insert_child(parent, len, child)
    }

    pub fn insert_child(&mut self, parent: FeatureId, index: usize, child: FeatureId) -> Result<()> {
        self.check_attachable(parent, child)?;
        let children = &mut self.features[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.features[child.0].parent = Some(parent);
        Ok(())
    }

    /// Detaches `child` from `parent`. The child and its subtree stay in the
    /// arena as a detached subtree.
    pub fn remove_child(&mut self, parent: FeatureId, child: FeatureId) -> Result<()> {
        let position = self.child_position(parent, child)?;
        self.features[parent.0].children.remove(position);
        self.features[child.0].parent = None;
        Ok(())
    }

    /// Puts the detached feature `new` in place of `old`, detaching `old`.
    pub fn replace_child(&mut self, parent: FeatureId, old: FeatureId, new: FeatureId) -> Result<()> {
        let position = self.child_position(parent, old)?;
        self.check_attachable(parent, new)?;
        self.features[parent.0].children[position] = new;
        self.features[new.0].parent = Some(parent);
        self.features[old.0].parent = None;
        Ok(())
    }

    /// Replaces `id` in its parent's child list by its own children, in order.
    /// `id` is left detached and childless.
    pub fn splice_into_parent(&mut self, id: FeatureId) -> Result<()> {
        self.check_live(id)?;
        let parent = self.features[id.0]
            .parent
            .ok_or_else(|| Error::InvalidStructure(format!("{} has no parent", self.features[id.0].name)))?;
        let position = self.child_position(parent, id)?;
        let children = std::mem::take(&mut self.features[id.0].children);
        for &child in &children {
            self.features[child.0].parent = Some(parent);
        }
        self.features[parent.0].children.splice(position..=position, children);
        self.features[id.0].parent = None;
        Ok(())
    }

    fn child_position(&self, parent: FeatureId, child: FeatureId) -> Result<usize> {
        self.check_live(parent)?;
        self.check_live(child)?;
        self.features[parent.0]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                Error::InvalidStructure(format!(
                    "{} is not a child of {}",
                    self.features[child.0].name, self.features[parent.0].name
                ))
            })
    }

    /// Removes a detached subtree from the model, freeing its names.
    pub fn delete_subtree(&mut self, id: FeatureId) -> Result<()> {
        self.check_live(id)?;
        if self.features[id.0].parent.is_some() || self.root == Some(id) {
            return Err(Error::InvalidStructure(format!(
                "{} must be detached before deletion",
                self.features[id.0].name
            )));
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let feature = &mut self.features[cur.0];
            feature.removed = true;
            stack.extend(feature.children.iter().copied());
            self.names.remove(&feature.name);
        }
        Ok(())
    }

    pub fn rename(&mut self, id: FeatureId, name: impl Into<String>) -> Result<()> {
        self.check_live(id)?;
        let name = name.into();
        if self.features[id.0].name == name {
            return Ok(());
        }
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        let old = std::mem::replace(&mut self.features[id.0].name, name.clone());
        self.names.remove(&old);
        self.names.insert(name, id);
        Ok(())
    }

    pub fn set_group(&mut self, id: FeatureId, group: GroupKind) {
        self.features[id.0].group = group;
    }

    pub fn set_mandatory(&mut self, id: FeatureId, mandatory: bool) {
        self.features[id.0].mandatory = mandatory;
    }

    pub fn set_abstract(&mut self, id: FeatureId, is_abstract: bool) {
        self.features[id.0].is_abstract = is_abstract;
    }

    pub fn set_hidden(&mut self, id: FeatureId, hidden: bool) {
        self.features[id.0].hidden = hidden;
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Adds a cross-tree constraint. Every feature it mentions must exist.
    pub fn add_constraint(&mut self, formula: Formula) -> Result<usize> {
        if let Some(unknown) = formula.contained_features().into_iter().find(|name| !self.contains_name(name)) {
            return Err(Error::UnknownFeature(unknown.to_string()));
        }
        self.constraints.push(Constraint {
            formula,
            attribute: ConstraintAttribute::Normal,
            element_id: self.next_element_id,
        });
        self.next_element_id += 1;
        Ok(self.constraints.len() - 1)
    }

    pub fn remove_constraint(&mut self, index: usize) -> Option<Constraint> {
        (index < self.constraints.len()).then(|| self.constraints.remove(index))
    }

    pub(crate) fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    pub(crate) fn set_constraint_attribute(&mut self, index: usize, attribute: ConstraintAttribute) {
        if let Some(constraint) = self.constraints.get_mut(index) {
            constraint.attribute = attribute;
        }
    }

    /// Copy of the model holding only the features reachable from the root,
    /// renumbered in pre-order. Element ids are kept.
    pub fn compacted(&self) -> FeatureModel {
        let order = self.features();
        let mut remap: FxHashMap<FeatureId, FeatureId> = FxHashMap::default();
        for (new, &old) in order.iter().enumerate() {
            remap.insert(old, FeatureId(new));
        }

        let mut features = Vec::with_capacity(order.len());
        let mut names = FxHashMap::default();
        for &old in &order {
            let source = &self.features[old.0];
            let id = FeatureId(features.len());
            names.insert(source.name.clone(), id);
            features.push(Feature {
                parent: source.parent.map(|p| remap[&p]),
                children: source.children.iter().map(|c| remap[c]).collect(),
                ..source.clone()
            });
        }

        FeatureModel {
            features,
            names,
            root: self.root.map(|r| remap[&r]),
            constraints: self.constraints.clone(),
            next_element_id: self.next_element_id,
        }
    }

    /// Checks the structural invariants of the tree reachable from the root:
    /// consistent parent/child links, no cycles, unique names, live nodes only.
    pub fn validate(&self) -> Result<()> {
        let root = self.root.ok_or(Error::NoRoot)?;
        self.check_live(root)?;
        if self.features[root.0].parent.is_some() {
            return Err(Error::InvalidStructure("root has a parent".to_string()));
        }

        let mut visited: FxHashSet<FeatureId> = FxHashSet::default();
        let mut names: FxHashSet<&str> = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.check_live(id)?;
            if !visited.insert(id) {
                return Err(Error::InvalidStructure(format!("{} is reachable twice", self.name(id))));
            }
            let feature = &self.features[id.0];
            if !names.insert(&feature.name) {
                return Err(Error::DuplicateName(feature.name.clone()));
            }
            if self.names.get(&feature.name) != Some(&id) {
                return Err(Error::InvalidStructure(format!("name index out of date for {}", feature.name)));
            }
            for &child in &feature.children {
                if self.features.get(child.0).and_then(|c| c.parent) != Some(id) {
                    return Err(Error::InvalidStructure(format!(
                        "child {} of {} does not point back to its parent",
                        child, feature.name
                    )));
                }
                stack.push(child);
            }
        }
        Ok(())
    }

    /// Checks that every `Or`/`Alternative` group has at least two children.
    ///
    /// Input models may violate this (a single-child group is degenerate but
    /// meaningful); sliced models never do.
    pub fn validate_groups(&self) -> Result<()> {
        for id in self.features() {
            let feature = &self.features[id.0];
            if feature.group != GroupKind::And && feature.children.len() < 2 {
                return Err(Error::InvalidStructure(format!(
                    "{} has a {} group with {} children",
                    feature.name,
                    feature.group,
                    feature.children.len()
                )));
            }
        }
        Ok(())
    }

    fn fmt_subtree(&self, f: &mut fmt::Formatter<'_>, id: FeatureId, depth: usize) -> fmt::Result {
        let feature = &self.features[id.0];
        write!(f, "{:indent$}{}", "", feature.name, indent = depth * 2)?;

        let mut tags: Vec<String> = Vec::new();
        if feature.has_children() {
            tags.push(feature.group.to_string());
        }
        if let Some(parent) = feature.parent {
            if self.features[parent.0].group == GroupKind::And {
                tags.push(if feature.mandatory { "mandatory" } else { "optional" }.to_string());
            }
        }
        if feature.is_abstract {
            tags.push("abstract".to_string());
        }
        if feature.hidden {
            tags.push("hidden".to_string());
        }
        if !tags.is_empty() {
            write!(f, " [{}]", tags.join(", "))?;
        }
        writeln!(f)?;

        for &child in &feature.children {
            self.fmt_subtree(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for FeatureModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_subtree(f, root, 0)?,
            None => writeln!(f, "<empty>")?,
        }
        for constraint in &self.constraints {
            write!(f, "constraint: {}", constraint.formula)?;
            if constraint.attribute != ConstraintAttribute::Normal {
                write!(f, " [{:?}]", constraint.attribute)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
