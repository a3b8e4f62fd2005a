//! Node context injection for multi-instance logging
//!
//! Many routers share one thread in a simulation. The simulator sets the
//! node it is currently dispatching to with a [`NodeContextGuard`], so
//! every span opened while handling that event can be attributed to it.

use std::cell::RefCell;

use aodv_core::NodeAddress;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// The node's address as a string
    pub node: String,
    /// Short form of the address
    pub short_id: String,
    /// Simulation run this node belongs to
    pub run_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// When this guard is created, it sets the node context for the current
/// thread. When it's dropped, it restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use aodv_core::Ipv4Address;
/// use aodv_logging::NodeContextGuard;
///
/// let node = Ipv4Address::new(10, 1, 1, 3);
/// let _guard = NodeContextGuard::new(&node);
///
/// // Spans opened in this scope carry node = "10.1.1.3"
/// tracing::info!("Handling frame");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Set the node context with a fresh run id
    pub fn new<A: NodeAddress>(address: &A) -> Self {
        Self::with_run_id(address, Uuid::new_v4())
    }

    /// Set the node context for a known simulation run
    pub fn with_run_id<A: NodeAddress>(address: &A, run_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = NodeContextData {
            node: address.to_string(),
            short_id: address.short_id(),
            run_id,
        };

        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node address (if set)
    pub fn current_node() -> Option<String> {
        Self::current().map(|ctx| ctx.node)
    }

    /// Get the current run id (if set)
    pub fn current_run_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.run_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to run a block within a node context
///
/// # Example
///
/// ```ignore
/// with_node_context!(&address, {
///     tracing::info!("Processing frame");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($address:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($address);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::Ipv4Address;

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());

        let node = Ipv4Address::new(10, 1, 1, 7);
        {
            let _guard = NodeContextGuard::new(&node);

            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node, "10.1.1.7");
            assert_eq!(ctx.short_id, "7");
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let a = Ipv4Address::new(10, 1, 1, 1);
        let b = Ipv4Address::new(10, 1, 1, 2);
        let run = Uuid::new_v4();

        {
            let _guard_a = NodeContextGuard::with_run_id(&a, run);
            assert_eq!(NodeContextGuard::current_node(), Some("10.1.1.1".to_string()));

            {
                let _guard_b = NodeContextGuard::with_run_id(&b, run);
                assert_eq!(NodeContextGuard::current_node(), Some("10.1.1.2".to_string()));
            }

            assert_eq!(NodeContextGuard::current_node(), Some("10.1.1.1".to_string()));
            assert_eq!(NodeContextGuard::current_run_id(), Some(run));
        }

        assert!(NodeContextGuard::current_node().is_none());
    }

    #[test]
    fn test_macro_scopes_context() {
        let node = Ipv4Address::new(10, 1, 1, 4);
        let seen = crate::with_node_context!(&node, { NodeContextGuard::current_node() });
        assert_eq!(seen, Some("10.1.1.4".to_string()));
        assert!(NodeContextGuard::current().is_none());
    }
}
