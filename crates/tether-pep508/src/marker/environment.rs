use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tether_pep440::{Version, VersionParseError};

use crate::{MarkerValueString, MarkerValueVersion, StringVersion};

/// The concrete values of the PEP 508 environment keys for one target interpreter and platform.
///
/// Deserializes from the JSON object printed by the interpreter probe, for example:
///
/// ```json
/// {"implementation_name": "cpython", "python_version": "3.12", "sys_platform": "linux", ...}
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct MarkerEnvironment {
    implementation_name: String,
    implementation_version: StringVersion,
    os_name: String,
    platform_machine: String,
    platform_python_implementation: String,
    platform_release: String,
    platform_system: String,
    platform_version: String,
    python_full_version: StringVersion,
    python_version: StringVersion,
    sys_platform: String,
}

impl MarkerEnvironment {
    /// Returns the version value for the given key.
    pub fn get_version(&self, key: &MarkerValueVersion) -> &Version {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version.version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version.version,
            MarkerValueVersion::PythonVersion => &self.python_version.version,
        }
    }

    /// Returns the version value for the given key, as it was written.
    pub fn get_version_string(&self, key: &MarkerValueVersion) -> &str {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version.string,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version.string,
            MarkerValueVersion::PythonVersion => &self.python_version.string,
        }
    }

    /// Returns the string value for the given key. Deprecated spellings resolve to the same value
    /// as their modern name.
    pub fn get_string(&self, key: &MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName | MarkerValueString::OsNameDeprecated => &self.os_name,
            MarkerValueString::PlatformMachine | MarkerValueString::PlatformMachineDeprecated => {
                &self.platform_machine
            }
            MarkerValueString::PlatformPythonImplementation
            | MarkerValueString::PlatformPythonImplementationDeprecated
            | MarkerValueString::PythonImplementationDeprecated => {
                &self.platform_python_implementation
            }
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion | MarkerValueString::PlatformVersionDeprecated => {
                &self.platform_version
            }
            MarkerValueString::SysPlatform | MarkerValueString::SysPlatformDeprecated => {
                &self.sys_platform
            }
        }
    }

    /// `implementation_name`, e.g. `cpython`.
    pub fn implementation_name(&self) -> &str {
        &self.implementation_name
    }

    /// `python_full_version`, e.g. `3.12.1`.
    pub fn python_full_version(&self) -> &StringVersion {
        &self.python_full_version
    }

    /// `python_version`, e.g. `3.12`.
    pub fn python_version(&self) -> &StringVersion {
        &self.python_version
    }

    /// `sys_platform`, e.g. `linux` or `win32`.
    pub fn sys_platform(&self) -> &str {
        &self.sys_platform
    }

    /// `os_name`, e.g. `posix` or `nt`.
    pub fn os_name(&self) -> &str {
        &self.os_name
    }

    /// `platform_system`, e.g. `Linux` or `Windows`.
    pub fn platform_system(&self) -> &str {
        &self.platform_system
    }

    /// `platform_machine`, e.g. `x86_64`.
    pub fn platform_machine(&self) -> &str {
        &self.platform_machine
    }
}

/// A builder for [`MarkerEnvironment`], taking every key as a string.
///
/// The version keys are parsed when converting into a [`MarkerEnvironment`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub struct MarkerEnvironmentBuilder<'a> {
    pub implementation_name: &'a str,
    pub implementation_version: &'a str,
    pub os_name: &'a str,
    pub platform_machine: &'a str,
    pub platform_python_implementation: &'a str,
    pub platform_release: &'a str,
    pub platform_system: &'a str,
    pub platform_version: &'a str,
    pub python_full_version: &'a str,
    pub python_version: &'a str,
    pub sys_platform: &'a str,
}

impl<'a> TryFrom<MarkerEnvironmentBuilder<'a>> for MarkerEnvironment {
    type Error = VersionParseError;

    fn try_from(builder: MarkerEnvironmentBuilder<'a>) -> Result<Self, Self::Error> {
        Ok(Self {
            implementation_name: builder.implementation_name.to_string(),
            implementation_version: StringVersion::from_str(builder.implementation_version)?,
            os_name: builder.os_name.to_string(),
            platform_machine: builder.platform_machine.to_string(),
            platform_python_implementation: builder.platform_python_implementation.to_string(),
            platform_release: builder.platform_release.to_string(),
            platform_system: builder.platform_system.to_string(),
            platform_version: builder.platform_version.to_string(),
            python_full_version: StringVersion::from_str(builder.python_full_version)?,
            python_version: StringVersion::from_str(builder.python_version)?,
            sys_platform: builder.sys_platform.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json() {
        let env: MarkerEnvironment = serde_json::from_str(
            r##"{
                "implementation_name": "cpython",
                "implementation_version": "3.7.13",
                "os_name": "posix",
                "platform_machine": "x86_64",
                "platform_python_implementation": "CPython",
                "platform_release": "5.4.188+",
                "platform_system": "Linux",
                "platform_version": "#1 SMP Sun Apr 24 10:03:06 PDT 2022",
                "python_full_version": "3.7.13",
                "python_version": "3.7",
                "sys_platform": "linux"
            }"##,
        )
        .unwrap();
        assert_eq!(env.sys_platform(), "linux");
        assert_eq!(env.python_version().to_string(), "3.7");
        assert_eq!(
            env.get_version(&MarkerValueVersion::PythonFullVersion),
            &Version::new([3, 7, 13])
        );
        assert_eq!(
            env.get_string(&MarkerValueString::SysPlatformDeprecated),
            "linux"
        );
    }

    #[test]
    fn from_json_invalid_version() {
        let err = serde_json::from_str::<MarkerEnvironment>(
            r#"{
                "implementation_name": "cpython",
                "implementation_version": "3.7.13",
                "os_name": "posix",
                "platform_machine": "x86_64",
                "platform_python_implementation": "CPython",
                "platform_release": "",
                "platform_system": "Linux",
                "platform_version": "",
                "python_full_version": "three",
                "python_version": "3.7",
                "sys_platform": "linux"
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("three"), "{err}");
    }
}
