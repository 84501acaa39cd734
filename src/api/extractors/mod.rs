/**
 * Responsibility
 *  - Request-scoped values the pipeline attaches for handlers
 *  - Handlers take these types instead of reading extensions directly
 */
mod correlation;
mod principal;

pub use principal::CurrentPrincipal;
