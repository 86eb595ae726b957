use std::fmt;

/// How the attributed address was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessOrigin {
    /// A standalone address computation instruction.
    AddressComputation,
    /// A constant address expression used by a load.
    Load,
    /// A constant address expression used by a store.
    Store,
}

impl fmt::Display for AccessOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessOrigin::AddressComputation => "address",
            AccessOrigin::Load => "load",
            AccessOrigin::Store => "store",
        };
        f.write_str(name)
    }
}

/// One attribution event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldAccess {
    pub structure: String,
    pub field: u64,
    pub origin: AccessOrigin,
}

impl FieldAccess {
    pub fn new(structure: impl Into<String>, field: u64, origin: AccessOrigin) -> Self {
        Self {
            structure: structure.into(),
            field,
            origin,
        }
    }
}

/// Destination for attribution events.
pub trait AccessSink {
    fn record(&mut self, access: &FieldAccess);
}

impl AccessSink for Vec<FieldAccess> {
    fn record(&mut self, access: &FieldAccess) {
        self.push(access.clone());
    }
}
