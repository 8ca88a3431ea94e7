//! GPU queue classes and capabilities.

use bitflags::bitflags;

use crate::barrier::{AccessMask, StageMask};

/// Logical queue class.
///
/// A device may back several classes with the same hardware queue; the
/// scheduler only cares about the class reported by
/// [`crate::GpuDevice::available_queues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueueType {
    Graphics = 0,
    AsyncCompute = 1,
    AsyncTransfer = 2,
}

impl QueueType {
    pub const COUNT: usize = 3;

    pub const ALL: [QueueType; Self::COUNT] = [
        QueueType::Graphics,
        QueueType::AsyncCompute,
        QueueType::AsyncTransfer,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(QueueType::Graphics),
            1 => Some(QueueType::AsyncCompute),
            2 => Some(QueueType::AsyncTransfer),
            _ => None,
        }
    }

    pub fn mask(self) -> QueueMask {
        match self {
            QueueType::Graphics => QueueMask::GRAPHICS,
            QueueType::AsyncCompute => QueueMask::ASYNC_COMPUTE,
            QueueType::AsyncTransfer => QueueMask::ASYNC_TRANSFER,
        }
    }
}

bitflags! {
    /// Set of queue classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueMask: u8 {
        const GRAPHICS = 1 << 0;
        const ASYNC_COMPUTE = 1 << 1;
        const ASYNC_TRANSFER = 1 << 2;
    }
}

impl QueueMask {
    /// Iterates the queue types present in the mask.
    pub fn iter_queues(self) -> impl Iterator<Item = QueueType> {
        QueueType::ALL
            .into_iter()
            .filter(move |q| self.contains(q.mask()))
    }
}

/// Pipeline stages and access kinds a queue class supports.
///
/// Barrier masks derived from [`crate::ResourceState`] are intersected with
/// these before they reach the device, so a transfer queue never sees
/// graphics-only stage bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCaps {
    pub supported_stages: StageMask,
    pub supported_access: AccessMask,
}

impl QueueCaps {
    pub fn graphics() -> Self {
        Self {
            supported_stages: StageMask::all(),
            supported_access: AccessMask::all(),
        }
    }

    pub fn compute() -> Self {
        Self {
            supported_stages: StageMask::TOP_OF_PIPE
                | StageMask::COMPUTE_SHADER
                | StageMask::TRANSFER
                | StageMask::HOST
                | StageMask::BOTTOM_OF_PIPE,
            supported_access: AccessMask::SHADER_READ
                | AccessMask::SHADER_WRITE
                | AccessMask::UNIFORM_READ
                | AccessMask::TRANSFER_READ
                | AccessMask::TRANSFER_WRITE
                | AccessMask::HOST_READ
                | AccessMask::HOST_WRITE
                | AccessMask::MEMORY_READ
                | AccessMask::MEMORY_WRITE,
        }
    }

    pub fn transfer() -> Self {
        Self {
            supported_stages: StageMask::TOP_OF_PIPE
                | StageMask::TRANSFER
                | StageMask::HOST
                | StageMask::BOTTOM_OF_PIPE,
            supported_access: AccessMask::TRANSFER_READ
                | AccessMask::TRANSFER_WRITE
                | AccessMask::HOST_READ
                | AccessMask::HOST_WRITE
                | AccessMask::MEMORY_READ
                | AccessMask::MEMORY_WRITE,
        }
    }
}
