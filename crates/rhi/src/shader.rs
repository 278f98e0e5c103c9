//! SPIR-V shader modules.
//!
//! Shaders are compiled offline from `shaders/*.{vert,tesc,tese,frag}` and
//! looked up as `<program>.<stage>.spv`, so `terrain.tesc.spv` holds the
//! tessellation control stage of the `terrain` program.

use std::ffi::CStr;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Every module is compiled with this entry point.
pub const ENTRY_POINT: &CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    /// Hull stage: picks tessellation factors per patch.
    TessControl,
    /// Domain stage: places the generated vertices.
    TessEvaluation,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Source extension, which is also how `glslc` infers the stage.
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::TessControl => "tesc",
            ShaderStage::TessEvaluation => "tese",
            ShaderStage::Fragment => "frag",
        }
    }

    /// Compiled module of `program` for this stage inside `dir`.
    pub fn spirv_path(self, dir: &Path, program: &str) -> PathBuf {
        dir.join(format!("{program}.{}.spv", self.extension()))
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Turns a SPIR-V file's bytes into words. Rejects sizes that are not a
/// multiple of four and a wrong magic number.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("not SPIR-V: {e}")))
}

/// A shader module tagged with its stage. Only needed until the pipelines
/// using it are created.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads the `stage` module of `program` from `dir`.
    ///
    /// A missing or unreadable file is a [`RhiError::ShaderError`] naming
    /// the path.
    pub fn load(
        device: Arc<Device>,
        dir: &Path,
        program: &str,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = stage.spirv_path(dir, program);
        let bytes = std::fs::read(&path)
            .map_err(|e| RhiError::ShaderError(format!("{}: {e}", path.display())))?;
        let shader = Self::from_spirv(device, &bytes, stage)
            .map_err(|e| RhiError::ShaderError(format!("{}: {e}", path.display())))?;
        debug!("Loaded {} shader {}", stage, path.display());
        Ok(shader)
    }

    /// Creates a module from SPIR-V bytes already in memory.
    pub fn from_spirv(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&info, None)? };
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
    }
}
