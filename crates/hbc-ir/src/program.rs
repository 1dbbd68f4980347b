//! Programs, packages, globals and type definitions.

use std::collections::HashMap;

use crate::con::Const;
use crate::error::IrError;
use crate::func::Func;
use crate::typ::Type;

/// A global variable or literal stored in memory.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub full_name: String,
    pub typ: Type,
    /// Initial value; `None` reserves zeroed storage.
    pub value: Option<Const>,
    /// Set when reachable from a program entry point.
    pub referenced: bool,
}

/// A named type alias.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub typ: Type,
}

/// A collection of functions, globals and typedefs forming part of a
/// program.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub path: String,
    globals: Vec<Global>,
    typedefs: Vec<TypeDef>,
    funcs: Vec<Func>,
}

impl Package {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            path: path.into(),
            globals: Vec::new(),
            typedefs: Vec::new(),
            funcs: Vec::new(),
        }
    }

    pub fn funcs(&self) -> &[Func] {
        &self.funcs
    }

    pub fn funcs_mut(&mut self) -> &mut [Func] {
        &mut self.funcs
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut [Global] {
        &mut self.globals
    }

    pub fn typedefs(&self) -> &[TypeDef] {
        &self.typedefs
    }

    pub fn func_by_name(&self, name: &str) -> Option<&Func> {
        self.funcs.iter().find(|f| f.name == name)
    }
}

/// A whole program: a set of packages keyed by import path, plus a
/// table guaranteeing full-name uniqueness across the program.
///
/// The name table is written only during front-end construction and
/// parsing; compilation passes never touch it.
#[derive(Debug, Clone, Default)]
pub struct Program {
    packages: Vec<Package>,
    taken_names: HashMap<String, ()>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn packages_mut(&mut self) -> &mut [Package] {
        &mut self.packages
    }

    /// Add a package; the import path must be unique.
    pub fn add_package(&mut self, pkg: Package) -> Result<usize, IrError> {
        if self.packages.iter().any(|p| p.path == pkg.path) {
            return Err(IrError::DuplicateName(pkg.path));
        }
        self.packages.push(pkg);
        Ok(self.packages.len() - 1)
    }

    pub fn package_by_path(&self, path: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.path == path)
    }

    pub fn package_by_name(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    fn claim_name(&mut self, full_name: &str) -> Result<(), IrError> {
        if self.taken_names.contains_key(full_name) {
            return Err(IrError::DuplicateName(full_name.to_string()));
        }
        self.taken_names.insert(full_name.to_string(), ());
        Ok(())
    }

    /// Add a function to a package, enforcing full-name uniqueness.
    pub fn add_func(&mut self, pkg_idx: usize, func: Func) -> Result<(), IrError> {
        self.claim_name(&func.full_name.clone())?;
        self.packages[pkg_idx].funcs.push(func);
        Ok(())
    }

    pub fn add_global(&mut self, pkg_idx: usize, global: Global) -> Result<(), IrError> {
        self.claim_name(&global.full_name.clone())?;
        self.packages[pkg_idx].globals.push(global);
        Ok(())
    }

    pub fn add_typedef(&mut self, pkg_idx: usize, td: TypeDef) {
        self.packages[pkg_idx].typedefs.push(td);
    }

    pub fn func_by_full_name(&self, full_name: &str) -> Option<&Func> {
        self.packages
            .iter()
            .flat_map(|p| p.funcs.iter())
            .find(|f| f.full_name == full_name)
    }

    pub fn global_by_full_name(&self, full_name: &str) -> Option<&Global> {
        self.packages
            .iter()
            .flat_map(|p| p.globals.iter())
            .find(|g| g.full_name == full_name)
    }

    pub fn global_by_full_name_mut(&mut self, full_name: &str) -> Option<&mut Global> {
        self.packages
            .iter_mut()
            .flat_map(|p| p.globals.iter_mut())
            .find(|g| g.full_name == full_name)
    }

    /// Every function in the program, in package then declaration
    /// order.
    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.packages.iter().flat_map(|p| p.funcs.iter())
    }

    pub fn funcs_mut(&mut self) -> impl Iterator<Item = &mut Func> {
        self.packages.iter_mut().flat_map(|p| p.funcs.iter_mut())
    }
}
