use std::collections::HashMap;

use ash::vk;
use strata_gfx::{GfxBackend, GfxError, GfxResult};

/// shader 的来源，负责把名字变成 SPIR-V
///
/// 编译器与文件系统都在渲染器之外。
pub trait ShaderSource: Send + Sync {
    /// return: SPIR-V 字；失败时返回编译器的错误信息
    fn load(&self, name: &str) -> Result<Vec<u32>, String>;
}

/// 从 `.spv` 文件读取，`name` 为相对于根目录的路径
pub struct SpirvDirectory {
    root: std::path::PathBuf,
}

impl SpirvDirectory {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for SpirvDirectory {
    fn load(&self, name: &str) -> Result<Vec<u32>, String> {
        let path = self.root.join(name);
        let mut file = std::fs::File::open(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        ash::util::read_spv(&mut file).map_err(|e| format!("{}: {e}", path.display()))
    }
}

/// 按名字缓存的 shader module，属于 Device Level
///
/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源。
pub struct ShaderLibrary {
    modules: HashMap<String, vk::ShaderModule>,

    #[cfg(debug_assertions)]
    destroyed: bool,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl ShaderLibrary {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            #[cfg(debug_assertions)]
            destroyed: false,
        }
    }
}

// getters
impl ShaderLibrary {
    #[inline]
    pub fn get(&self, name: &str) -> Option<vk::ShaderModule> {
        self.modules.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// update
impl ShaderLibrary {
    /// 已经加载过的直接返回
    pub fn get_or_load(
        &mut self,
        backend: &dyn GfxBackend,
        source: &dyn ShaderSource,
        name: &str,
        tolerate_errors: bool,
    ) -> GfxResult<vk::ShaderModule> {
        match self.get(name) {
            Some(module) => Ok(module),
            None => self.reload(backend, source, name, tolerate_errors),
        }
    }

    /// 重新编译并替换
    ///
    /// 编译失败时：`tolerate_errors` 且存在旧的 module 则继续使用旧的，否则返回错误。
    pub fn reload(
        &mut self,
        backend: &dyn GfxBackend,
        source: &dyn ShaderSource,
        name: &str,
        tolerate_errors: bool,
    ) -> GfxResult<vk::ShaderModule> {
        let module = source
            .load(name)
            .map_err(|message| GfxError::ShaderCompile {
                name: name.to_string(),
                message,
            })
            .and_then(|code| backend.create_shader_module(&code, name));

        match module {
            Ok(module) => {
                if let Some(previous) = self.modules.insert(name.to_string(), module) {
                    backend.destroy_shader_module(previous);
                    log::info!("shader `{name}` reloaded");
                } else {
                    log::debug!("shader `{name}` loaded");
                }
                Ok(module)
            }
            Err(e) => {
                log::error!("{e}");
                match self.get(name) {
                    Some(previous) if tolerate_errors => {
                        log::warn!("keep using the previous module of shader `{name}`");
                        Ok(previous)
                    }
                    _ => Err(e),
                }
            }
        }
    }
}

// destroy
impl ShaderLibrary {
    pub fn destroy(mut self, backend: &dyn GfxBackend) {
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }

        let modules = std::mem::take(&mut self.modules);
        let count = modules.len();
        modules.into_values().for_each(|module| backend.destroy_shader_module(module));
        log::debug!("destroyed {count} shader module(s)");
    }
}

impl Drop for ShaderLibrary {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed || self.modules.is_empty(), "ShaderLibrary must be destroyed manually before drop.");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;
    use strata_gfx::mock::MockBackend;

    use super::*;

    /// 可以在测试中修改内容的 shader 来源
    #[derive(Default)]
    pub(crate) struct FakeShaders {
        sources: Mutex<HashMap<String, Result<Vec<u32>, String>>>,
    }

    impl FakeShaders {
        pub(crate) fn set(&self, name: &str, source: Result<Vec<u32>, String>) {
            self.sources.lock().insert(name.to_string(), source);
        }
    }

    impl ShaderSource for FakeShaders {
        fn load(&self, name: &str) -> Result<Vec<u32>, String> {
            self.sources.lock().get(name).cloned().unwrap_or_else(|| Err(format!("{name} not found")))
        }
    }

    const SPIRV: [u32; 2] = [0x0723_0203, 0x0001_0000];

    #[test]
    fn modules_are_cached_by_name() {
        let backend = MockBackend::new();
        let shaders = FakeShaders::default();
        shaders.set("blit.frag", Ok(SPIRV.to_vec()));

        let mut library = ShaderLibrary::new();
        let first = library.get_or_load(&backend, &shaders, "blit.frag", false).unwrap();
        let second = library.get_or_load(&backend, &shaders, "blit.frag", false).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.live("shader_module"), 1);

        library.destroy(&backend);
        assert!(backend.all_released());
    }

    #[test]
    fn failed_reload_falls_back_when_tolerated() {
        let backend = MockBackend::new();
        let shaders = FakeShaders::default();
        shaders.set("ui.frag", Ok(SPIRV.to_vec()));

        let mut library = ShaderLibrary::new();
        let original = library.get_or_load(&backend, &shaders, "ui.frag", true).unwrap();

        shaders.set("ui.frag", Err("syntax error at line 3".to_string()));
        assert_eq!(library.reload(&backend, &shaders, "ui.frag", true).unwrap(), original);

        let err = library.reload(&backend, &shaders, "ui.frag", false).unwrap_err();
        assert!(matches!(err, GfxError::ShaderCompile { ref message, .. } if message.contains("line 3")));
        // 失败不会影响已经加载的 module
        assert_eq!(library.get("ui.frag"), Some(original));

        library.destroy(&backend);
    }

    #[test]
    fn first_load_failure_is_fatal_even_when_tolerated() {
        let backend = MockBackend::new();
        let shaders = FakeShaders::default();
        let mut library = ShaderLibrary::new();
        assert!(library.get_or_load(&backend, &shaders, "missing.vert", true).is_err());
        assert!(library.is_empty());
    }

    #[test]
    fn successful_reload_replaces_the_module() {
        let backend = MockBackend::new();
        let shaders = FakeShaders::default();
        shaders.set("ui.vert", Ok(SPIRV.to_vec()));

        let mut library = ShaderLibrary::new();
        let original = library.get_or_load(&backend, &shaders, "ui.vert", false).unwrap();
        let reloaded = library.reload(&backend, &shaders, "ui.vert", false).unwrap();
        assert_ne!(original, reloaded);
        assert_eq!(backend.live("shader_module"), 1);

        library.destroy(&backend);
        assert!(backend.all_released());
    }
}
