// Shader module loading
//
// Shaders are compiled to SPIR-V by build.rs and read from disk at startup,
// so a missing compiler only fails at runtime with a readable error.

use anyhow::{Context, Result};
use ash::vk;
use std::io::{Read, Seek};
use std::path::Path;
use super::VulkanDevice;

/// Decode SPIR-V words from any reader, fixing byte order if needed
pub fn parse_spirv<R: Read + Seek>(reader: &mut R) -> Result<Vec<u32>> {
    ash::util::read_spv(reader).context("Invalid SPIR-V")
}

pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open shader {:?}", path))?;
    parse_spirv(&mut file).with_context(|| format!("Failed to read shader {:?}", path))
}

/// Shader module that is destroyed when it goes out of scope.
///
/// Only needed until the pipeline that uses it has been created.
pub struct ShaderModule<'a> {
    pub module: vk::ShaderModule,
    device: &'a VulkanDevice,
}

impl<'a> ShaderModule<'a> {
    pub fn new(device: &'a VulkanDevice, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self { module, device })
    }

    pub fn from_file(device: &'a VulkanDevice, path: &Path) -> Result<Self> {
        let code = read_spirv(path)?;
        log::debug!("Loaded shader {:?} ({} words)", path, code.len());
        Self::new(device, &code)
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MAGIC: u32 = 0x0723_0203;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn valid_words_are_decoded() {
        let bytes = words_to_bytes(&[MAGIC, 0x0001_0000, 7, 42]);
        let words = parse_spirv(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(words, vec![MAGIC, 0x0001_0000, 7, 42]);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut bytes = words_to_bytes(&[MAGIC, 1]);
        bytes.pop();
        assert!(parse_spirv(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spirv(Path::new("does/not/exist.spv")).unwrap_err();
        assert!(format!("{:#}", err).contains("exist.spv"));
    }
}
