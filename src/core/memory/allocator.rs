use std::alloc::Layout;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("alignment requirement {required} not supported (max: {supported})")]
    AlignmentNotSupported { required: usize, supported: usize },
}

/// Validates that a fixed-cell layout is usable by [`crate::core::memory::BlockPool`].
pub fn validate_cell_layout(layout: Layout) -> Result<(), AllocError> {
    if !layout.align().is_power_of_two() {
        return Err(AllocError::InvalidLayout(format!(
            "alignment {} is not a power of two",
            layout.align()
        )));
    }
    if layout.size() == 0 {
        return Err(AllocError::InvalidLayout("zero-sized cell".into()));
    }
    const MAX_ALIGN: usize = 4096;
    if layout.align() > MAX_ALIGN {
        return Err(AllocError::AlignmentNotSupported {
            required: layout.align(),
            supported: MAX_ALIGN,
        });
    }
    Ok(())
}
