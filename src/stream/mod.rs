pub mod delta;
pub mod event;
pub mod lines;
pub mod relay;
pub mod translate;

pub use delta::{extract_delta, try_extract_delta, Delta, ExtractError};
pub use event::{decode_line, BackendEvent, DecodeFailure, DATA_PREFIX, DONE_SENTINEL};
pub use lines::{line_stream, LineFramer};
pub use relay::{open_session, RelayState, StreamSession};
pub use translate::{translate, TranslatedChunk};
