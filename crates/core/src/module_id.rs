// dbgobj - Debugger Object Model
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use auto_impl::auto_impl;
use dbgobj_common::types::{ModuleId, ModuleInfo};

/// Maps a module snapshot to the id breakpoint locations are matched against.
#[auto_impl(&, Arc, Box)]
pub trait ModuleIdProvider: Send + Sync {
    /// Computes the id of `info`.
    fn module_id(&self, info: &ModuleInfo) -> ModuleId;
}

/// Names on-disk modules after their file and in-memory or dynamic modules
/// after their module name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModuleIdProvider;

impl ModuleIdProvider for DefaultModuleIdProvider {
    fn module_id(&self, info: &ModuleInfo) -> ModuleId {
        let module_name = if info.is_dynamic || info.is_in_memory || info.filename.is_empty() {
            info.name.clone()
        } else {
            info.filename.clone()
        };

        ModuleId {
            assembly_name: info.name.clone(),
            module_name,
            is_dynamic: info.is_dynamic,
            is_in_memory: info.is_in_memory,
            name_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_module_uses_filename() {
        let info = ModuleInfo {
            name: "app".to_string(),
            filename: "/opt/app/app.dll".to_string(),
            ..Default::default()
        };
        assert_eq!(
            DefaultModuleIdProvider.module_id(&info),
            ModuleId::new("app", "/opt/app/app.dll")
        );
    }

    #[test]
    fn test_dynamic_module_uses_name() {
        let info = ModuleInfo {
            name: "RefEmit_InMemoryManifestModule".to_string(),
            filename: "ignored".to_string(),
            is_dynamic: true,
            ..Default::default()
        };
        let id = DefaultModuleIdProvider.module_id(&info);
        assert_eq!(id.module_name, "RefEmit_InMemoryManifestModule");
        assert!(id.is_dynamic);
        assert_eq!(
            id.to_string(),
            "RefEmit_InMemoryManifestModule!RefEmit_InMemoryManifestModule#dynamic"
        );
    }
}
