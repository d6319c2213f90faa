//! SPIR-V loading and shader module creation.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use skyscatter_rhi::device::Device;
//! use skyscatter_rhi::ledger::GpuLedger;
//! use skyscatter_rhi::shader::{ShaderModule, ShaderStage};
//!
//! # fn example(device: &Device, ledger: &mut GpuLedger) -> skyscatter_rhi::RhiResult<()> {
//! let shader = ShaderModule::from_spirv_file(
//!     device,
//!     Path::new("shaders/spirv/atmosphere.comp.spv"),
//!     ShaderStage::Compute,
//!     ledger,
//! )?;
//! let _stage_info = shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::ledger::{GpuLedger, GpuObject};

/// First word of every SPIR-V binary.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point every shader in this project uses.
pub const ENTRY_POINT: &CStr = c"main";

/// Shader pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A shader module handle and the stage it was compiled for.
#[derive(Clone, Copy, Debug)]
pub struct ShaderModule {
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Reads a SPIR-V file and creates a module from it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file cannot be read or is
    /// not SPIR-V.
    pub fn from_spirv_file(
        device: &Device,
        path: &Path,
        stage: ShaderStage,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, ledger)
    }

    /// Creates a module from SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: &Device,
        bytes: &[u8],
        stage: ShaderStage,
        ledger: &mut GpuLedger,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };
        ledger.record(GpuObject::ShaderModule(module));

        info!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self { module, stage })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

/// Converts little-endian SPIR-V bytes into code words.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if code[0] != SPIRV_MAGIC {
        return Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number {:#010x}",
            code[0]
        )));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            ShaderStage::Compute.to_vk_stage(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Compute), "compute");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_decode_spirv_reads_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0600u32.to_le_bytes());

        let code = decode_spirv(&bytes).unwrap();
        assert_eq!(code, vec![SPIRV_MAGIC, 0x0001_0600]);
    }

    #[test]
    fn test_decode_spirv_rejects_misaligned_input() {
        let result = decode_spirv(&[0x03, 0x02, 0x23, 0x07, 0x00]);
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_decode_spirv_rejects_empty_input() {
        assert!(matches!(decode_spirv(&[]), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_decode_spirv_rejects_wrong_magic() {
        let bytes = 0xdead_beefu32.to_le_bytes();
        let err = decode_spirv(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_entry_point_name() {
        assert_eq!(ENTRY_POINT.to_str().unwrap(), "main");
    }
}
