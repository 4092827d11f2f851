//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::{LookupSpan, SpanRef},
};

use crate::context::{UserContext, UserContextGuard};

/// Attaches the active [`UserContext`] to every new span
#[derive(Debug, Default)]
pub struct UserContextLayer;

impl UserContextLayer {
    pub fn new() -> Self {
        Self
    }

    /// User context recorded on a span or its nearest ancestor
    pub fn context_of<'a, S>(span: &SpanRef<'a, S>) -> Option<UserContext>
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        span.scope().find_map(|s| {
            s.extensions()
                .get::<UserContextExtension>()
                .map(|ext| ext.context.clone())
        })
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct UserContextExtension {
    pub context: UserContext,
}

impl<S> Layer<S> for UserContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(context) = UserContextGuard::current() else {
            return;
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(UserContextExtension { context });
        }
    }
}
