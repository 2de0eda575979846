use crate::buildsystems::cmake::CMake;
use crate::buildsystems::{BuildContext, BuildSystem, BuildSystemKind};
use crate::error::Result;

/// CMake driven through the Ninja generator. Each step calls the CMake backend directly.
#[derive(Debug, Clone)]
pub struct Ninja {
    cmake: CMake,
}

impl Ninja {
    pub fn new() -> Self {
        Self {
            cmake: CMake {
                generator: "Ninja".into(),
            },
        }
    }
}

impl Default for Ninja {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSystem for Ninja {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Ninja
    }

    fn required_tools(&self) -> Vec<&'static str> {
        self.cmake.required_tools()
    }

    fn configured(&self, bc: &BuildContext) -> bool {
        self.cmake.configured(bc)
    }

    fn configure_options(&self, bc: &BuildContext) -> Result<Vec<String>> {
        self.cmake.configure_options(bc)
    }

    fn configure(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.cmake.configure(bc, options)
    }

    fn build(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.cmake.build(bc, options)
    }

    fn install(&self, bc: &BuildContext, options: &[String]) -> Result<()> {
        self.cmake.install(bc, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_both_tools() {
        assert_eq!(Ninja::new().required_tools(), vec!["cmake", "ninja"]);
    }
}
