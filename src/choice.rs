//! Choices: one of several alternatives, picked by the `selection` parameter.
//!
//! Alternatives are instantiated on first selection and cached, so switching
//! back to a previously used alternative finds its old value. With
//! `copy_on_change`, the previous alternative's value is assigned to the new
//! one whenever the selection changes. Clearing a choice drops the cache.

use crate::error::{BinDataError, Result};
use crate::params::{Nested, SanitizedField};
use crate::stream::ByteReader;
use crate::tree::{ObjectId, State, Tree};
use std::collections::BTreeMap;
use std::sync::Arc;

impl Tree {
    fn alternatives(&self, id: ObjectId) -> Result<Arc<[(i128, SanitizedField)]>> {
        match self.nested(id)? {
            Nested::Choices(alternatives) => Ok(alternatives),
            _ => Ok(Arc::from(Vec::new())),
        }
    }

    /// Evaluate `selection` and return the matching alternative,
    /// instantiating it if needed. An unmatched selection leaves the
    /// cache untouched.
    pub(crate) fn current_choice(&mut self, id: ObjectId) -> Result<ObjectId> {
        let selection = self
            .eval_param(id, "selection", &crate::env::Overrides::none())?
            .ok_or_else(|| BinDataError::MandatoryParameterMissing {
                type_name: self.type_name(id).unwrap_or_default().to_string(),
                param: "selection".to_string(),
            })?;
        let alternatives = self.alternatives(id)?;
        let position = selection
            .as_int()
            .and_then(|key| alternatives.iter().position(|(k, _)| *k == key));
        let position = match position {
            Some(p) => p,
            None => {
                return Err(BinDataError::InvalidSelection {
                    debug_name: self.debug_name(id)?,
                    selection: selection.to_string(),
                    choices: alternatives.len(),
                })
            }
        };

        let (cached, last) = match &self.node(id)?.state {
            State::Choice { cache, last } => (cache.get(&position).copied(), *last),
            _ => (None, None),
        };
        let child = match cached {
            Some(child) => child,
            None => {
                let child = self.instantiate(&alternatives[position].1, Some(id), BTreeMap::new())?;
                if let State::Choice { cache, .. } = &mut self.node_mut(id)?.state {
                    cache.insert(position, child);
                }
                child
            }
        };

        if last != Some(position) {
            if let Some(previous) = last {
                log::debug!(
                    "{}: selection changed from alternative {} to {}",
                    self.debug_name(id)?,
                    previous,
                    position
                );
                if self.flag(id, "copy_on_change")? {
                    let previous_child = match &self.node(id)?.state {
                        State::Choice { cache, .. } => cache.get(&previous).copied(),
                        _ => None,
                    };
                    if let Some(previous_child) = previous_child {
                        let v = self.value(previous_child)?;
                        self.assign(child, v)?;
                    }
                }
            }
            if let State::Choice { last, .. } = &mut self.node_mut(id)?.state {
                *last = Some(position);
            }
        }
        Ok(child)
    }

    pub(crate) fn read_choice(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        let child = self.current_choice(id)?;
        self.read(child, reader)
    }

    /// Drop every instantiated alternative.
    pub(crate) fn clear_choice(&mut self, id: ObjectId) -> Result<()> {
        let cached: Vec<ObjectId> = match &mut self.node_mut(id)?.state {
            State::Choice { cache, last } => {
                *last = None;
                std::mem::take(cache).into_values().collect()
            }
            _ => Vec::new(),
        };
        for child in cached {
            self.release(child)?;
        }
        Ok(())
    }

    pub(crate) fn choice_is_clear(&mut self, id: ObjectId) -> Result<bool> {
        let cached: Vec<ObjectId> = match &self.node(id)?.state {
            State::Choice { cache, .. } => cache.values().copied().collect(),
            _ => Vec::new(),
        };
        for child in cached {
            if !self.is_clear(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
