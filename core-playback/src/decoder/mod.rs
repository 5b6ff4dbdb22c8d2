//! # Bundled Decoders
//!
//! Real tracker formats are decoded by external renderers plugged in through
//! [`NonstreamDecoder`](crate::traits::NonstreamDecoder). The one decoder
//! shipped here renders "tone sheets": a tiny synthetic format with subsongs
//! and authored loop points. It exercises every part of the decoder
//! contract, which makes it useful for demos and for testing hosts.
//!
//! ## Tone Sheet Layout
//!
//! All integers little-endian.
//!
//! | Field          | Size        | Notes                                  |
//! |----------------|-------------|----------------------------------------|
//! | magic          | 4           | `TONE`                                 |
//! | rate           | u32         | 0 = use the downstream preference      |
//! | channels       | u16         | 0 = use the downstream preference      |
//! | title          | u8 + bytes  | length 0 = none                        |
//! | comment        | u8 + bytes  | length 0 = none                        |
//! | subsong count  | u16         |                                        |
//! | per subsong    | 4 × u32     | frames, loop start, loop end, freq Hz  |
//!
//! A subsong loops when `loop_start < loop_end <= frames`.

mod tone;

pub use tone::{ToneDecoder, ToneSheet, ToneSubsong, TONE_MEDIA_TYPE};
