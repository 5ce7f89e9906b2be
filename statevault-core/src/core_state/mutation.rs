//! Mutation notifications delivered over the state feed

/// How a state change was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A single property was written directly
    Direct,
    /// A bulk patch was merged into the state (used when applying restored
    /// state, among other things)
    PatchObject,
}

/// A single change notification
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Identifier of the store that changed
    pub store_id: String,
    /// How the change was applied
    pub kind: MutationKind,
}
