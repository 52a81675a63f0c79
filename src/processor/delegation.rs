use crate::source::Capability;

/// Where a capability call on a processor is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The processor's own implementation
    Local,
    /// Forwarded to the upstream stage
    Upstream,
}

/// Per-capability routing, fixed when the processor is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationTable {
    routes: [Route; Capability::ALL.len()],
}

impl DelegationTable {
    pub fn new(local: &[Capability]) -> Self {
        let mut routes = [Route::Upstream; Capability::ALL.len()];
        for capability in local {
            routes[Self::slot(*capability)] = Route::Local;
        }
        Self { routes }
    }

    pub fn route(&self, capability: Capability) -> Route {
        self.routes[Self::slot(capability)]
    }

    fn slot(capability: Capability) -> usize {
        match capability {
            Capability::Camera => 0,
            Capability::FrameSize => 1,
            Capability::Fps => 2,
            Capability::FrameCount => 3,
            Capability::Path => 4,
            Capability::Devices => 5,
        }
    }
}
