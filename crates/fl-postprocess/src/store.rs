//! Layered hyperparameter storage: user value > dynamic default > static default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use fl_types::{HyperparameterError, HyperparameterValue};

/// A single registered hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterEntry {
    pub name: String,
    /// Present iff the user explicitly configured the hyperparameter.
    pub set_value: Option<HyperparameterValue>,
    /// Static default, replaced by a dynamic default once computed.
    pub default_value: Option<HyperparameterValue>,
}

impl HyperparameterEntry {
    pub fn effective(&self) -> Option<&HyperparameterValue> {
        self.set_value.as_ref().or(self.default_value.as_ref())
    }
}

/// Ordered store of hyperparameters for one post-processing instance.
///
/// Not synchronized; callers sharing an instance across threads must
/// serialize access themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HyperparameterStore {
    entries: Vec<HyperparameterEntry>,
    index: HashMap<String, usize>,
}

impl HyperparameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a hyperparameter with an optional static default.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        default: Option<HyperparameterValue>,
    ) -> Result<(), HyperparameterError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(HyperparameterError::DuplicateName { name });
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(HyperparameterEntry {
            name,
            set_value: None,
            default_value: default,
        });
        Ok(())
    }

    /// Record the user's explicit choice.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<HyperparameterValue>,
    ) -> Result<(), HyperparameterError> {
        self.entry_mut(name)?.set_value = Some(value.into());
        Ok(())
    }

    /// Replace the default slot only; a user value is left untouched.
    pub fn override_default(
        &mut self,
        name: &str,
        value: impl Into<HyperparameterValue>,
    ) -> Result<(), HyperparameterError> {
        self.entry_mut(name)?.default_value = Some(value.into());
        Ok(())
    }

    /// Apply a batch of dynamic defaults, stopping at the first unknown name.
    pub fn merge_defaults<I>(&mut self, defaults: I) -> Result<usize, HyperparameterError>
    where
        I: IntoIterator<Item = (String, HyperparameterValue)>,
    {
        let mut merged = 0;
        for (name, value) in defaults {
            self.override_default(&name, value)?;
            merged += 1;
        }
        Ok(merged)
    }

    pub fn effective(&self, name: &str) -> Result<&HyperparameterValue, HyperparameterError> {
        self.entry(name)?
            .effective()
            .ok_or_else(|| HyperparameterError::Unresolved {
                name: name.to_string(),
            })
    }

    /// Snapshot of every effective value in registration order.
    pub fn all_effective(&self) -> ResolvedHyperparameters {
        ResolvedHyperparameters {
            entries: self
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.effective().cloned()))
                .collect(),
        }
    }

    /// `ClassName(name1=value1,name2=value2)` over user-set values only,
    /// so dynamic defaults never change the rendering.
    pub fn render(&self, class_name: &str) -> String {
        let configured: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.set_value.as_ref().map(|v| format!("{}={}", e.name, v)))
            .collect();
        format!("{}({})", class_name, configured.join(","))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_user_set(&self, name: &str) -> Result<bool, HyperparameterError> {
        Ok(self.entry(name)?.set_value.is_some())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[HyperparameterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&HyperparameterEntry, HyperparameterError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| HyperparameterError::Unknown {
                name: name.to_string(),
            })
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut HyperparameterEntry, HyperparameterError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(HyperparameterError::Unknown {
                name: name.to_string(),
            }),
        }
    }
}

/// Read-only snapshot of effective hyperparameter values.
///
/// Entries without any value are kept (so the snapshot still lists every
/// registered name) but looking them up fails with `Unresolved`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHyperparameters {
    entries: Vec<(String, Option<HyperparameterValue>)>,
}

impl ResolvedHyperparameters {
    pub fn get(&self, name: &str) -> Result<&HyperparameterValue, HyperparameterError> {
        let (_, value) = self
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| HyperparameterError::Unknown {
                name: name.to_string(),
            })?;
        value.as_ref().ok_or_else(|| HyperparameterError::Unresolved {
            name: name.to_string(),
        })
    }

    pub fn get_str(&self, name: &str) -> Result<&str, HyperparameterError> {
        self.get(name)?.as_str(name)
    }

    pub fn get_usize(&self, name: &str) -> Result<usize, HyperparameterError> {
        self.get(name)?.as_usize(name)
    }

    pub fn get_seed(&self, name: &str) -> Result<u64, HyperparameterError> {
        self.get(name)?.as_seed(name)
    }

    /// Resolved `(name, value)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperparameterValue)> {
        self.entries
            .iter()
            .filter_map(|(n, v)| v.as_ref().map(|v| (n.as_str(), v)))
    }

    /// Names registered without any value.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
