//! Utilities built on top of [`osal`].

#![no_std]

pub mod delay;

pub use delay::Delay;
