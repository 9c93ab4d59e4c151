use std::collections::HashMap;
use std::sync::Arc;

use super::parsers::smtp::SmtpHandlerFactory;
use super::HandlerFactory;

/// Maps service ports to the handler factory that decodes them.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<u16, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for one port, replacing any previous one.
    pub fn register<F: HandlerFactory + 'static>(&mut self, port: u16, factory: F) {
        self.factories.insert(port, Arc::new(factory));
    }

    /// Register one factory for several ports.
    pub fn register_ports<F: HandlerFactory + 'static>(&mut self, ports: &[u16], factory: F) {
        let factory: Arc<dyn HandlerFactory> = Arc::new(factory);
        for &port in ports {
            self.factories.insert(port, Arc::clone(&factory));
        }
    }

    /// Get the factory for a port.
    pub fn get(&self, port: u16) -> Option<&dyn HandlerFactory> {
        self.factories.get(&port).map(|f| f.as_ref())
    }

    pub fn is_registered(&self, port: u16) -> bool {
        self.factories.contains_key(&port)
    }

    /// The service port of a connection between `port_a` and `port_b`:
    /// the one registered port, or `None` when both or neither are.
    pub fn service_port(&self, port_a: u16, port_b: u16) -> Option<u16> {
        match (self.is_registered(port_a), self.is_registered(port_b)) {
            (true, false) => Some(port_a),
            (false, true) => Some(port_b),
            _ => None,
        }
    }

    /// Registered ports in ascending order.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.factories.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for port in self.ports() {
            if let Some(factory) = self.get(port) {
                map.entry(&port, &factory.name());
            }
        }
        map.finish()
    }
}

/// Registry with SMTP on ports 25 and 587.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register_ports(&[25, 587], SmtpHandlerFactory);
    registry
}
