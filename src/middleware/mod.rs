pub mod correlation_id;

pub use correlation_id::{
    correlation_id_middleware, make_span_with_correlation_id, ClientCorrelationId,
    CorrelationId, CORRELATION_ID_HEADER,
};
