//! Pipeline stages for turning one record into images.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and a stage's backend (e.g. the PDF renderer) can change
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! resolve ──▶ normalize ──▶ (render) ──▶ encode
//! (link/manual) (RGB + blank)  (pdfium)    (PNG)
//! ```
//!
//! 1. [`resolve`]   — fetch the linked attachment once, or take the manual
//!    image; classify it as image or document
//! 2. [`normalize`] — decode to RGB, reject blank fetched images, send
//!    documents to the renderer
//! 3. [`render`]    — rasterise every PDF page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 4. [`encode`]    — PNG-encode images for the document and the archives

pub mod encode;
pub mod normalize;
pub mod render;
pub mod resolve;
