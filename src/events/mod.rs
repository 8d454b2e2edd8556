//! Event emitter and stream encoding

mod emitter;
mod encoder;
mod event;

pub use emitter::{ChannelEmitter, EventSink};
pub use encoder::{
    DONE_SENTINEL, FlattenedResponse, StreamDecoder, StreamItem, collect_flattened, encode_data,
};
pub use event::FlowEvent;

#[cfg(test)]
pub(crate) use emitter::tests::RecordingSink;
