//! # Page-Table Allocator Strategies
//!
//! The two [`TableAllocator`] implementations an [`AddressSpace`] is built
//! with over the life of the kernel.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              AddressSpace (kernel-pgtable)          │
//! │    • walks, links tables with a single CAS          │
//! │    • hands back tables that lost a race             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ TableAllocator
//!        ┌──────────┴──────────────┐
//! ┌──────▼──────────────┐  ┌───────▼────────────────────┐
//! │ BootstrapTableAlloc │  │ GeneralTableAlloc<F>       │
//! │ • MMU off/identity  │  │ • direct map (base + pa)   │
//! │ • bump over window  │  │ • recycle list + F         │
//! └─────────────────────┘  └────────────────────────────┘
//! ```
//!
//! ## Bootstrap ([`BootstrapTableAlloc`])
//!
//! Used before the direct map exists. Tables are carved from a physical
//! window reserved at boot and addressed by their physical address. A table
//! handed back is reclaimed only when it was the last one handed out; the
//! rest of the window is never returned.
//!
//! ## General ([`GeneralTableAlloc`])
//!
//! Used once the kernel runs on its own tables. Frames come from a
//! [`FrameSource`] (the physical page allocator) and are reached through the
//! direct map. Tables handed back are zeroed and kept on a spin-locked list
//! that is consulted before the frame source.
//!
//! [`AddressSpace`]: kernel_pgtable::AddressSpace
//! [`TableAllocator`]: kernel_pgtable::TableAllocator

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bootstrap;
mod general;

pub use crate::bootstrap::{BootstrapTableAlloc, WindowError};
pub use crate::general::{FrameSource, GeneralTableAlloc};
