use serde::{Deserialize, Serialize};

use crate::domain::record::{CustomerRecord, ProductRecord};
use crate::errors::DomainError;

/// Identity of one renderable fragment. Monotonic per conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(pub u64);

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fragment-{}", self.0)
    }
}

/// The renderable node shown for one interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentBody {
    Spinner,
    Skeleton { label: String },
    Markdown { text: String },
    CustomerList { customers: Vec<CustomerRecord> },
    ProductList { products: Vec<ProductRecord> },
}

/// Lifecycle of a fragment. Streamed text renders inside the placeholder
/// phase; `Loading` is entered only while a function call is in flight.
/// `Final` fragments are frozen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentPhase {
    Placeholder,
    Loading,
    Final,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UiFragment {
    pub id: FragmentId,
    pub phase: FragmentPhase,
    pub body: FragmentBody,
}

impl UiFragment {
    pub fn is_final(&self) -> bool {
        self.phase == FragmentPhase::Final
    }
}

/// Ordered list of UI fragments for one conversation, updated in place as a
/// turn streams and frozen when the turn completes.
#[derive(Clone, Debug, Default)]
pub struct FragmentLog {
    next_id: u64,
    fragments: Vec<UiFragment>,
}

impl FragmentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new placeholder fragment for an interaction that just started.
    pub fn open(&mut self) -> FragmentId {
        let id = FragmentId(self.next_id);
        self.next_id += 1;
        self.fragments.push(UiFragment {
            id,
            phase: FragmentPhase::Placeholder,
            body: FragmentBody::Spinner,
        });
        id
    }

    /// Replace the body of a non-final fragment. The phase is unchanged, so
    /// streamed text keeps overwriting the placeholder in arrival order.
    pub fn update(&mut self, id: FragmentId, body: FragmentBody) -> Result<(), DomainError> {
        let fragment = self.open_entry(id)?;
        fragment.body = body;
        Ok(())
    }

    /// Move a non-final fragment into the loading phase with a named skeleton.
    pub fn begin_loading(
        &mut self,
        id: FragmentId,
        label: impl Into<String>,
    ) -> Result<(), DomainError> {
        let fragment = self.open_entry(id)?;
        fragment.phase = FragmentPhase::Loading;
        fragment.body = FragmentBody::Skeleton { label: label.into() };
        Ok(())
    }

    /// Freeze a fragment with its final render. Further mutation fails.
    pub fn finalize(&mut self, id: FragmentId, body: FragmentBody) -> Result<(), DomainError> {
        let fragment = self.open_entry(id)?;
        fragment.phase = FragmentPhase::Final;
        fragment.body = body;
        Ok(())
    }

    pub fn get(&self, id: FragmentId) -> Option<&UiFragment> {
        self.fragments.iter().find(|fragment| fragment.id == id)
    }

    pub fn fragments(&self) -> &[UiFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn finalized_count(&self) -> usize {
        self.fragments.iter().filter(|fragment| fragment.is_final()).count()
    }

    fn open_entry(&mut self, id: FragmentId) -> Result<&mut UiFragment, DomainError> {
        let fragment = self
            .fragments
            .iter_mut()
            .find(|fragment| fragment.id == id)
            .ok_or_else(|| DomainError::InvariantViolation(format!("unknown {id}")))?;

        if fragment.phase == FragmentPhase::Final {
            return Err(DomainError::FragmentFinalized(id));
        }
        Ok(fragment)
    }
}
