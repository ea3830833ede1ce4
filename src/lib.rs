// Module layout (Clean Architecture style)
// - bootstrap: configuration and startup
// - infrastructure: DB and outbound-source adapters
// - presentation: HTTP handlers and routing
// - application: policies, services, and use cases
// - domain: core models

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
