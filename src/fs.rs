//! The filesystem: path resolution over the directory tree and the
//! host-facing operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use log::debug;
use parking_lot::Mutex;

use crate::attr::AttrValue;
use crate::attr::AttributeService;
use crate::attr::BasicFileAttributes;
use crate::attr::DosFileAttributes;
use crate::attr::PosixFileAttributes;
use crate::channel::FileChannel;
use crate::config::Config;
use crate::config::Features;
use crate::dir::Directory;
use crate::disk::HeapDisk;
use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::file::FileKind;
use crate::file::Inner;
use crate::file::lock_two;
use crate::name::Name;
use crate::options::CopyOption;
use crate::options::CopyOptions;
use crate::options::LinkOption;
use crate::options::OpenOption;
use crate::options::OpenOptions;
use crate::options::nofollow;
use crate::path::EntryPath;
use crate::path::PathService;
use crate::state::FileSystemState;
use crate::stream::InputStream;
use crate::stream::OutputStream;
use crate::time::FileTimeSource;
use crate::time::SystemTimeSource;
use crate::watch::EventKind;
use crate::watch::WatchEvent;
use crate::watch::WatchKey;
use crate::watch::WatchService;

/// How many symbolic links one resolution may follow before giving up with
/// [`Error::Loop`].
const MAX_SYMBOLIC_LINK_DEPTH: u32 = 40;

/// Where a path landed: the directory holding the final entry, the entry's
/// name, and the file it points at (absent for a creatable target). Paths
/// naming a root alone resolve to a file with no parent.
struct Resolution {
    parent: Option<Arc<File>>,
    name: Option<Name>,
    file: Option<Arc<File>>,
}

fn dir_table<'a>(inner: &'a Inner, ctx: &str) -> Result<&'a Directory> {
    inner
        .directory()
        .ok_or_else(|| Error::NotDirectory(ctx.to_owned()))
}

fn dir_table_mut<'a>(inner: &'a mut Inner, ctx: &str) -> Result<&'a mut Directory> {
    inner
        .directory_mut()
        .ok_or_else(|| Error::NotDirectory(ctx.to_owned()))
}

fn symlink_target_of(file: &File) -> EntryPath {
    match file.symlink_target() {
        Some(target) => target,
        None => unreachable!("symlink file without a target"),
    }
}

/// An in-memory filesystem.
///
/// Everything lives on the heap: the directory tree, regular file content
/// (as fixed-size blocks drawn from one per-filesystem [`HeapDisk`]),
/// symbolic link targets and attributes. Operations take parsed
/// [`EntryPath`]s; relative paths resolve against the configured working
/// directory. Closing the filesystem fails subsequent operations but lets
/// already-open streams drain before final teardown.
pub struct FileSystem {
    config: Config,
    disk: Arc<HeapDisk>,
    path_service: PathService,
    attrs: AttributeService,
    clock: Arc<dyn FileTimeSource>,
    state: Arc<FileSystemState>,
    roots: Arc<Mutex<Vec<(Name, Arc<File>)>>>,
    working_directory: (EntryPath, Arc<File>),
    next_id: AtomicU64,
    watch_services: Arc<Mutex<Vec<Arc<WatchService>>>>,
}

impl FileSystem {
    /// Creates a filesystem from `config`, stamping times from the wall
    /// clock.
    pub fn new(config: Config) -> Result<FileSystem> {
        FileSystem::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Creates a filesystem with an injected clock; every timestamp the
    /// filesystem ever records comes from it.
    pub fn with_time_source(
        config: Config,
        clock: Arc<dyn FileTimeSource>,
    ) -> Result<FileSystem> {
        let path_service = PathService::new(
            config.path_type,
            config.name_display_normalization.clone(),
            config.name_canonical_normalization.clone(),
            config.path_equality_uses_canonical_form,
        );
        let attrs = AttributeService::new(
            &config.attribute_views,
            config.default_attribute_values.clone(),
        )?;
        let disk = Arc::new(HeapDisk::new(
            config.block_size,
            config.max_block_count(),
            config.max_cached_block_count(),
        ));

        let mut next_id = 0u64;
        let mut alloc_id = || {
            let id = next_id;
            next_id += 1;
            id
        };

        let mut roots: Vec<(Name, Arc<File>)> = Vec::new();
        for root in &config.roots {
            let name = path_service.name(root);
            if roots.iter().any(|(n, _)| n == &name) {
                return Err(Error::IllegalArgument(format!("duplicate root: {root}")));
            }
            let file = File::new_root_directory(alloc_id(), clock.now());
            attrs.set_initial_attributes(&file)?;
            // Held by the root table.
            file.incr_links();
            roots.push((name, file));
        }

        // Materialize the working directory chain before anything else can
        // see the tree.
        let wd_path = path_service
            .parse_path(&[config.working_directory.as_str()])?
            .normalize();
        let wd_root = match wd_path.root() {
            Some(root) => root.clone(),
            None => {
                return Err(Error::IllegalArgument(format!(
                    "working directory must be absolute: {}",
                    config.working_directory
                )));
            }
        };
        let mut wd_file = roots
            .iter()
            .find(|(n, _)| *n == wd_root)
            .map(|(_, f)| f.clone())
            .ok_or_else(|| {
                Error::IllegalArgument(format!(
                    "working directory is not under a configured root: {}",
                    config.working_directory
                ))
            })?;
        for name in wd_path.names() {
            let existing = {
                let guard = wd_file.lock();
                dir_table(&guard, &config.working_directory)?.get(name)
            };
            wd_file = match existing {
                Some(next) => next,
                None => {
                    let child = File::new_directory(alloc_id(), clock.now());
                    attrs.set_initial_attributes(&child)?;
                    {
                        let mut guard = wd_file.lock();
                        dir_table_mut(&mut guard, &config.working_directory)?
                            .link(name.clone(), child.clone())?;
                    }
                    child
                        .lock()
                        .directory_mut()
                        .map(|d| d.set_parent(Arc::downgrade(&wd_file)));
                    child
                }
            };
        }

        let roots = Arc::new(Mutex::new(roots));
        let watch_services: Arc<Mutex<Vec<Arc<WatchService>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let state = {
            let roots = roots.clone();
            let watch_services = watch_services.clone();
            Arc::new(FileSystemState::new(Box::new(move || {
                for service in watch_services.lock().drain(..) {
                    service.close();
                }
                roots.lock().clear();
            })))
        };

        Ok(FileSystem {
            config,
            disk,
            path_service,
            attrs,
            clock,
            state,
            roots,
            working_directory: (wd_path, wd_file),
            next_id: AtomicU64::new(next_id),
            watch_services,
        })
    }

    /// Parses one path string in this filesystem's path flavor.
    pub fn path(&self, s: &str) -> Result<EntryPath> {
        self.path_service.parse_path(&[s])
    }

    /// The path service: parsing, rendering, comparison, matchers.
    pub fn path_service(&self) -> &PathService {
        &self.path_service
    }

    /// The configuration this filesystem was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The absolute working directory path.
    pub fn working_directory(&self) -> &EntryPath {
        &self.working_directory.0
    }

    /// Total capacity in bytes.
    pub fn total_space(&self) -> u64 {
        self.disk.total_space()
    }

    /// Bytes held by regular files.
    pub fn used_space(&self) -> u64 {
        self.disk.allocated_space()
    }

    /// Bytes still available to regular files.
    pub fn unallocated_space(&self) -> u64 {
        self.disk.unallocated_space()
    }

    /// True until [`close`](FileSystem::close).
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Closes the filesystem. New operations fail with
    /// [`Error::ClosedFileSystem`]; watch services close and the tree is
    /// torn down once the last open stream or channel closes. Idempotent.
    pub fn close(&self) {
        self.state.close();
    }

    fn next_file_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn rendered(&self, path: &EntryPath) -> String {
        self.path_service.to_string(path)
    }

    fn require_feature(&self, feature: Features, what: &str) -> Result<()> {
        if self.config.supported_features.contains(feature) {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation(format!("{what} are not supported")))
        }
    }

    // ---------- path resolution ----------

    fn root_file(&self, root: &Name) -> Result<Arc<File>> {
        self.roots
            .lock()
            .iter()
            .find(|(name, _)| name == root)
            .map(|(_, file)| file.clone())
            .ok_or_else(|| Error::NoSuchFile(root.display().to_owned()))
    }

    fn lookup(&self, path: &EntryPath, follow_final: bool) -> Result<Resolution> {
        let ctx = self.rendered(path);
        let mut depth = 0u32;
        self.lookup_from(None, path, follow_final, &mut depth, &ctx)
    }

    /// Resolves `path` starting at `base` (the working directory when
    /// `base` is `None` and the path is relative).
    fn lookup_from(
        &self,
        base: Option<&Arc<File>>,
        path: &EntryPath,
        follow_final: bool,
        depth: &mut u32,
        ctx: &str,
    ) -> Result<Resolution> {
        let start = match path.root() {
            Some(root) => self.root_file(root)?,
            None => match base {
                Some(base) => base.clone(),
                None => self.working_directory.1.clone(),
            },
        };
        let names: Vec<&Name> = path
            .names()
            .iter()
            .filter(|name| !name.canonical().is_empty())
            .collect();
        if names.is_empty() {
            return Ok(Resolution {
                parent: None,
                name: None,
                file: Some(start),
            });
        }
        self.lookup_in(start, &names, follow_final, depth, ctx)
    }

    fn lookup_in(
        &self,
        dir: Arc<File>,
        names: &[&Name],
        follow_final: bool,
        depth: &mut u32,
        ctx: &str,
    ) -> Result<Resolution> {
        let Some((&name, rest)) = names.split_first() else {
            unreachable!("lookup_in requires at least one name")
        };
        let entry = {
            let guard = dir.lock();
            dir_table(&guard, ctx)?.get(name)
        };
        if rest.is_empty() {
            if follow_final {
                if let Some(file) = &entry {
                    if file.is_symlink() {
                        let target = symlink_target_of(file);
                        self.bump_depth(depth, ctx)?;
                        return self.lookup_from(Some(&dir), &target, true, depth, ctx);
                    }
                }
            }
            return Ok(Resolution {
                parent: Some(dir),
                name: Some(name.clone()),
                file: entry,
            });
        }
        let next = entry.ok_or_else(|| Error::NoSuchFile(ctx.to_owned()))?;
        let next = if next.is_symlink() {
            self.resolve_link(&dir, &next, depth, ctx)?
        } else {
            next
        };
        if !next.is_directory() {
            return Err(Error::NotDirectory(ctx.to_owned()));
        }
        self.lookup_in(next, rest, follow_final, depth, ctx)
    }

    fn resolve_link(
        &self,
        parent: &Arc<File>,
        link: &Arc<File>,
        depth: &mut u32,
        ctx: &str,
    ) -> Result<Arc<File>> {
        self.bump_depth(depth, ctx)?;
        let target = symlink_target_of(link);
        let resolved = self.lookup_from(Some(parent), &target, true, depth, ctx)?;
        resolved
            .file
            .ok_or_else(|| Error::NoSuchFile(ctx.to_owned()))
    }

    fn bump_depth(&self, depth: &mut u32, ctx: &str) -> Result<()> {
        *depth += 1;
        if *depth > MAX_SYMBOLIC_LINK_DEPTH {
            Err(Error::Loop(ctx.to_owned()))
        } else {
            Ok(())
        }
    }

    fn lookup_existing(&self, path: &EntryPath, follow_final: bool) -> Result<(Resolution, String)> {
        let ctx = self.rendered(path);
        let resolution = self.lookup(path, follow_final)?;
        if resolution.file.is_none() {
            return Err(Error::NoSuchFile(ctx));
        }
        Ok((resolution, ctx))
    }

    // ---------- creation ----------

    /// Creates a directory at `path`. The parent must already exist.
    pub fn create_directory(&self, path: &EntryPath) -> Result<()> {
        self.create_directory_with(path, &[])
    }

    /// Creates a directory with create-time attributes (e.g.
    /// `posix:permissions`).
    pub fn create_directory_with(
        &self,
        path: &EntryPath,
        attrs: &[(&str, AttrValue)],
    ) -> Result<()> {
        let created = self.clock.now();
        self.create(path, |id| File::new_directory(id, created), attrs)?;
        Ok(())
    }

    /// Creates an empty regular file at `path`.
    pub fn create_file(&self, path: &EntryPath) -> Result<()> {
        self.create_file_with(path, &[])
    }

    /// Creates an empty regular file with create-time attributes.
    pub fn create_file_with(&self, path: &EntryPath, attrs: &[(&str, AttrValue)]) -> Result<()> {
        let created = self.clock.now();
        let disk = self.disk.clone();
        self.create(path, |id| File::new_regular(id, disk, created), attrs)?;
        Ok(())
    }

    /// Creates a symbolic link at `link` holding `target` verbatim.
    pub fn create_symbolic_link(&self, link: &EntryPath, target: &EntryPath) -> Result<()> {
        self.require_feature(Features::SYMBOLIC_LINKS, "symbolic links")?;
        let created = self.clock.now();
        let target = target.clone();
        self.create(link, |id| File::new_symlink(id, target, created), &[])?;
        Ok(())
    }

    /// Creates a hard link at `link` to the regular file at `existing`.
    pub fn create_link(&self, link: &EntryPath, existing: &EntryPath) -> Result<()> {
        self.require_feature(Features::LINKS, "hard links")?;
        self.state.check_open()?;
        let (resolved, ctx) = self.lookup_existing(existing, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        if !file.is_regular() {
            return Err(Error::IllegalArgument(format!(
                "hard links may only reference regular files: {ctx}"
            )));
        }

        let link_ctx = self.rendered(link);
        let resolution = self.lookup(link, false)?;
        if resolution.file.is_some() {
            return Err(Error::FileAlreadyExists(link_ctx));
        }
        let (parent, name) = match (resolution.parent, resolution.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(Error::FileAlreadyExists(link_ctx)),
        };
        self.link_into(&parent, name.clone(), &file, &link_ctx)?;
        self.publish(&parent, EventKind::Create, &name);
        Ok(())
    }

    fn create(
        &self,
        path: &EntryPath,
        factory: impl FnOnce(u64) -> Arc<File>,
        attrs: &[(&str, AttrValue)],
    ) -> Result<Arc<File>> {
        self.state.check_open()?;
        let ctx = self.rendered(path);
        let resolution = self.lookup(path, false)?;
        if resolution.file.is_some() {
            return Err(Error::FileAlreadyExists(ctx));
        }
        let (parent, name) = match (resolution.parent, resolution.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(Error::FileAlreadyExists(ctx)),
        };

        let file = factory(self.next_file_id());
        self.attrs.set_initial_attributes(&file)?;
        for (key, value) in attrs {
            self.attrs.set_attribute(&file, key, value.clone(), true)?;
        }
        self.link_into(&parent, name.clone(), &file, &ctx)?;
        self.publish(&parent, EventKind::Create, &name);
        debug!("created {:?} at {ctx}", file.kind());
        Ok(file)
    }

    fn link_into(
        &self,
        parent: &Arc<File>,
        name: Name,
        file: &Arc<File>,
        ctx: &str,
    ) -> Result<()> {
        {
            let mut guard = parent.lock();
            dir_table_mut(&mut guard, ctx)?.link(name, file.clone())?;
            guard.set_modified(self.clock.now());
        }
        if file.is_directory() {
            let mut guard = file.lock();
            if let Some(table) = guard.directory_mut() {
                table.set_parent(Arc::downgrade(parent));
            }
        }
        Ok(())
    }

    // ---------- deletion ----------

    /// Deletes the entry at `path`. A trailing symbolic link is deleted
    /// itself, not its target. Directories must be empty; roots cannot be
    /// deleted.
    pub fn delete(&self, path: &EntryPath) -> Result<()> {
        self.state.check_open()?;
        let ctx = self.rendered(path);
        let resolution = self.lookup(path, false)?;
        let file = resolution.file.ok_or_else(|| Error::NoSuchFile(ctx.clone()))?;
        let (parent, name) = match (resolution.parent, resolution.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(Error::AccessDenied(format!("cannot delete root {ctx}")));
            }
        };

        if file.is_directory() {
            // Empty-check and unlink under both locks so no entry can
            // sneak in between them.
            let (mut parent_guard, child_guard) = lock_two(&parent, &file);
            let table = dir_table(&child_guard, &ctx)?;
            if table.is_root() {
                return Err(Error::AccessDenied(format!("cannot delete root {ctx}")));
            }
            if !table.is_empty() {
                return Err(Error::DirectoryNotEmpty(ctx));
            }
            dir_table_mut(&mut parent_guard, &ctx)?.unlink(&name)?;
            parent_guard.set_modified(self.clock.now());
        } else {
            let mut guard = parent.lock();
            dir_table_mut(&mut guard, &ctx)?.unlink(&name)?;
            guard.set_modified(self.clock.now());
        }
        file.maybe_reclaim();
        self.publish(&parent, EventKind::Delete, &name);
        debug!("deleted {ctx}");
        Ok(())
    }

    // ---------- copy and move ----------

    /// Copies `from` to `to`. Directories copy as new empty directories,
    /// symbolic links copy their target path, regular files deep-copy their
    /// blocks. `REPLACE_EXISTING` and `COPY_ATTRIBUTES` apply;
    /// `NOFOLLOW_LINKS` copies a trailing symlink itself.
    pub fn copy(&self, from: &EntryPath, to: &EntryPath, options: &[CopyOption]) -> Result<()> {
        self.state.check_open()?;
        let opts = CopyOptions::for_copy(options)?;
        let follow = !opts.contains(CopyOptions::NOFOLLOW_LINKS);
        let (resolved, _) = self.lookup_existing(from, follow)?;
        let src = resolved.file.unwrap_or_else(|| unreachable!());

        let to_ctx = self.rendered(to);
        let target = self.lookup(to, false)?;
        let (parent, name) = match (target.parent, target.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(Error::FileAlreadyExists(to_ctx)),
        };
        if let Some(existing) = target.file {
            if existing.id() == src.id() {
                return Ok(());
            }
            if !opts.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(Error::FileAlreadyExists(to_ctx));
            }
            self.delete(to)?;
        }

        let created = self.clock.now();
        let id = self.next_file_id();
        let copy = match src.kind() {
            FileKind::Directory => File::new_directory(id, created),
            FileKind::SymbolicLink => File::new_symlink(id, symlink_target_of(&src), created),
            FileKind::Regular => {
                let copy = File::new_regular(id, self.disk.clone(), created);
                // Fresh file ids ascend, so src before copy is the required
                // lock order; the copy is still private regardless.
                let src_guard = src.lock();
                let mut copy_guard = copy.lock();
                if let (Some(src_content), Some(copy_content)) =
                    (src_guard.regular(), copy_guard.regular_mut())
                {
                    src_content.copy_blocks_to(copy_content, src_content.block_count())?;
                    copy_content.set_size(src_content.size());
                }
                drop(copy_guard);
                drop(src_guard);
                copy
            }
        };
        self.attrs.set_initial_attributes(&copy)?;
        if opts.contains(CopyOptions::COPY_ATTRIBUTES) {
            self.attrs.copy_attributes(&src, &copy);
            let (c, m, a) = {
                let guard = src.lock();
                (guard.created(), guard.modified(), guard.accessed())
            };
            let mut guard = copy.lock();
            guard.set_created(c);
            guard.set_modified(m);
            guard.set_accessed(a);
        }
        self.link_into(&parent, name.clone(), &copy, &to_ctx)?;
        self.publish(&parent, EventKind::Create, &name);
        Ok(())
    }

    /// Moves `from` to `to`, by rename within a directory or a two-lock
    /// transfer across directories. A trailing symlink moves itself. A
    /// directory cannot move into its own subtree.
    pub fn rename(&self, from: &EntryPath, to: &EntryPath, options: &[CopyOption]) -> Result<()> {
        self.state.check_open()?;
        let opts = CopyOptions::for_move(options)?;
        let from_ctx = self.rendered(from);
        let to_ctx = self.rendered(to);

        let source = self.lookup(from, false)?;
        let file = source.file.ok_or_else(|| Error::NoSuchFile(from_ctx.clone()))?;
        let (src_parent, src_name) = match (source.parent, source.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => {
                return Err(Error::AccessDenied(format!("cannot move root {from_ctx}")));
            }
        };

        let target = self.lookup(to, false)?;
        let (dst_parent, dst_name) = match (target.parent, target.name) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(Error::FileAlreadyExists(to_ctx)),
        };
        if let Some(existing) = target.file {
            if existing.id() == file.id() {
                return Ok(());
            }
            if !opts.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(Error::FileAlreadyExists(to_ctx));
            }
            self.delete(to)?;
        }

        if file.is_directory() {
            self.check_not_in_subtree(&file, &dst_parent)?;
        }

        if src_parent.id() == dst_parent.id() {
            let mut guard = src_parent.lock();
            let table = dir_table_mut(&mut guard, &from_ctx)?;
            let moved = table.unlink(&src_name)?;
            if let Err(err) = table.link(dst_name.clone(), moved.clone()) {
                // Leave the tree as it was.
                let _ = table.link(src_name.clone(), moved);
                return Err(err);
            }
            guard.set_modified(self.clock.now());
        } else {
            let (mut src_guard, mut dst_guard) = lock_two(&src_parent, &dst_parent);
            let moved = dir_table_mut(&mut src_guard, &from_ctx)?.unlink(&src_name)?;
            if let Err(err) =
                dir_table_mut(&mut dst_guard, &to_ctx)?.link(dst_name.clone(), moved.clone())
            {
                let _ = dir_table_mut(&mut src_guard, &from_ctx)?.link(src_name.clone(), moved);
                return Err(err);
            }
            let now = self.clock.now();
            src_guard.set_modified(now);
            dst_guard.set_modified(now);
        }
        if file.is_directory() {
            let mut guard = file.lock();
            if let Some(table) = guard.directory_mut() {
                table.set_parent(Arc::downgrade(&dst_parent));
            }
        }
        self.publish(&src_parent, EventKind::Delete, &src_name);
        self.publish(&dst_parent, EventKind::Create, &dst_name);
        debug!("moved {from_ctx} to {to_ctx}");
        Ok(())
    }

    fn check_not_in_subtree(&self, dir: &Arc<File>, candidate: &Arc<File>) -> Result<()> {
        let mut current = candidate.clone();
        loop {
            if current.id() == dir.id() {
                return Err(Error::IllegalArgument(
                    "cannot move a directory into its own subtree".to_owned(),
                ));
            }
            let parent = {
                let guard = current.lock();
                match guard.directory() {
                    Some(table) if table.is_root() => None,
                    Some(table) => table.parent(),
                    None => None,
                }
            };
            match parent {
                Some(parent) => current = parent,
                None => return Ok(()),
            }
        }
    }

    // ---------- reading the tree ----------

    /// True when `path` resolves to an existing file, following symlinks.
    pub fn exists(&self, path: &EntryPath) -> bool {
        self.state.check_open().is_ok()
            && matches!(self.lookup(path, true), Ok(res) if res.file.is_some())
    }

    /// The sorted entries of the directory at `path`, as paths resolved
    /// against `path`. `.` and `..` are not listed.
    pub fn read_directory(&self, path: &EntryPath) -> Result<Vec<EntryPath>> {
        self.state.check_open()?;
        let (resolved, ctx) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        let mut names: Vec<Name> = {
            let mut guard = file.lock();
            let table = dir_table(&guard, &ctx)?;
            let names = table.live_entries().map(|e| e.name.clone()).collect();
            guard.set_accessed(self.clock.now());
            names
        };
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| path.resolve(&self.path_service.create_file_name(name)))
            .collect())
    }

    /// The stored target of the symbolic link at `path`.
    pub fn read_symbolic_link(&self, path: &EntryPath) -> Result<EntryPath> {
        self.require_feature(Features::SYMBOLIC_LINKS, "symbolic links")?;
        self.state.check_open()?;
        let (resolved, ctx) = self.lookup_existing(path, false)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        file.symlink_target()
            .ok_or(Error::NotSymbolicLink(ctx))
    }

    /// The canonical absolute path of the file at `path`: symlinks
    /// resolved, `.`/`..` folded, every name in its linked form.
    pub fn to_real_path(&self, path: &EntryPath) -> Result<EntryPath> {
        self.state.check_open()?;
        let (resolved, ctx) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());

        let (mut current, mut names) = match (&resolved.parent, &resolved.name) {
            (Some(parent), Some(name)) if !name.is_self() && !name.is_parent() => {
                (parent.clone(), vec![name.clone()])
            }
            _ => (file, Vec::new()),
        };
        loop {
            let (is_root, parent) = {
                let guard = current.lock();
                let table = dir_table(&guard, &ctx)?;
                (table.is_root(), table.parent())
            };
            if is_root {
                break;
            }
            let parent = parent.ok_or_else(|| Error::NoSuchFile(ctx.clone()))?;
            let name = {
                let guard = parent.lock();
                dir_table(&guard, &ctx)?
                    .live_entries()
                    .find(|entry| entry.file.id() == current.id())
                    .map(|entry| entry.name.clone())
            }
            .ok_or_else(|| Error::NoSuchFile(ctx.clone()))?;
            names.push(name);
            current = parent;
        }
        let root = self
            .roots
            .lock()
            .iter()
            .find(|(_, file)| file.id() == current.id())
            .map(|(name, _)| name.clone())
            .ok_or(Error::NoSuchFile(ctx))?;
        names.reverse();
        Ok(self.path_service.create_path(Some(root), names))
    }

    // ---------- streams and channels ----------

    /// Opens a read stream. WRITE and APPEND options are refused.
    pub fn new_input_stream(
        &self,
        path: &EntryPath,
        options: &[OpenOption],
    ) -> Result<InputStream> {
        self.state.check_open()?;
        let set = OpenOptions::for_input_stream(options)?;
        let (resolved, ctx) = self.lookup_existing(path, !set.contains(OpenOptions::NOFOLLOW_LINKS))?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.require_regular(&file, &ctx)?;
        Ok(InputStream::open(
            file,
            self.state.clone(),
            self.clock.clone(),
        ))
    }

    /// Opens a write stream. READ is refused; with no options at all the
    /// stream creates the file if needed and truncates existing content.
    pub fn new_output_stream(
        &self,
        path: &EntryPath,
        options: &[OpenOption],
    ) -> Result<OutputStream> {
        self.state.check_open()?;
        const DEFAULT_OUTPUT_OPTIONS: &[OpenOption] =
            &[OpenOption::Create, OpenOption::TruncateExisting];
        let options: &[OpenOption] = if options.is_empty() {
            DEFAULT_OUTPUT_OPTIONS
        } else {
            options
        };
        let set = OpenOptions::for_output_stream(options)?;
        let file = self.open_for_write(path, set)?;
        Ok(OutputStream::open(
            file,
            self.state.clone(),
            self.clock.clone(),
            set.is_append(),
        ))
    }

    /// Opens a random-access channel honoring the full open-option set.
    pub fn new_file_channel(
        &self,
        path: &EntryPath,
        options: &[OpenOption],
    ) -> Result<FileChannel> {
        self.require_feature(Features::FILE_CHANNEL, "file channels")?;
        self.state.check_open()?;
        let set = OpenOptions::for_channel(options)?;
        let file = if set.is_writable() {
            self.open_for_write(path, set)?
        } else {
            let (resolved, ctx) =
                self.lookup_existing(path, !set.contains(OpenOptions::NOFOLLOW_LINKS))?;
            let file = resolved.file.unwrap_or_else(|| unreachable!());
            self.require_regular(&file, &ctx)?;
            file
        };
        Ok(FileChannel::open(
            file,
            self.state.clone(),
            self.clock.clone(),
            set,
        ))
    }

    fn require_regular(&self, file: &Arc<File>, ctx: &str) -> Result<()> {
        match file.kind() {
            FileKind::Regular => Ok(()),
            FileKind::Directory => Err(Error::IsDirectory(ctx.to_owned())),
            FileKind::SymbolicLink => Err(Error::IllegalArgument(format!(
                "cannot open a symbolic link: {ctx}"
            ))),
        }
    }

    /// Resolves (or creates, per CREATE/CREATE_NEW) the regular file behind
    /// a writable stream or channel, applying TRUNCATE_EXISTING.
    fn open_for_write(&self, path: &EntryPath, set: OpenOptions) -> Result<Arc<File>> {
        let ctx = self.rendered(path);
        let follow = !set.contains(OpenOptions::NOFOLLOW_LINKS);
        let resolution = self.lookup(path, follow)?;
        match resolution.file {
            Some(file) => {
                if set.contains(OpenOptions::CREATE_NEW) {
                    return Err(Error::FileAlreadyExists(ctx));
                }
                self.require_regular(&file, &ctx)?;
                if set.contains(OpenOptions::TRUNCATE_EXISTING) {
                    {
                        let mut guard = file.lock();
                        if let Some(content) = guard.regular_mut() {
                            content.truncate(0);
                        }
                        guard.set_modified(self.clock.now());
                    }
                    if let (Some(parent), Some(name)) = (&resolution.parent, &resolution.name) {
                        self.publish(parent, EventKind::Modify, name);
                    }
                }
                Ok(file)
            }
            None => {
                if !set.intersects(OpenOptions::CREATE | OpenOptions::CREATE_NEW) {
                    return Err(Error::NoSuchFile(ctx));
                }
                let (parent, name) = match (resolution.parent, resolution.name) {
                    (Some(parent), Some(name)) => (parent, name),
                    _ => return Err(Error::NoSuchFile(ctx)),
                };
                let file = File::new_regular(
                    self.next_file_id(),
                    self.disk.clone(),
                    self.clock.now(),
                );
                self.attrs.set_initial_attributes(&file)?;
                self.link_into(&parent, name.clone(), &file, &ctx)?;
                self.publish(&parent, EventKind::Create, &name);
                Ok(file)
            }
        }
    }

    // ---------- attributes ----------

    /// Reads one attribute by `"view:attr"` key, following symlinks.
    pub fn get_attribute(&self, path: &EntryPath, key: &str) -> Result<AttrValue> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.attrs.get_attribute(&file, key)
    }

    /// Writes one attribute by `"view:attr"` key, following symlinks.
    pub fn set_attribute(&self, path: &EntryPath, key: &str, value: AttrValue) -> Result<()> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.attrs.set_attribute(&file, key, value, false)?;
        if let (Some(parent), Some(name)) = (&resolved.parent, &resolved.name) {
            self.publish(parent, EventKind::Modify, name);
        }
        Ok(())
    }

    /// Reads an attribute selection: `"view:*"` or `"view:a,b"`.
    pub fn read_attributes(
        &self,
        path: &EntryPath,
        spec: &str,
    ) -> Result<BTreeMap<String, AttrValue>> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.attrs.read_attributes(&file, spec)
    }

    /// A typed `basic` snapshot; `NOFOLLOW_LINKS` stats a trailing symlink
    /// itself.
    pub fn read_basic_attributes(
        &self,
        path: &EntryPath,
        options: &[LinkOption],
    ) -> Result<BasicFileAttributes> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, !nofollow(options))?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        Ok(self.attrs.basic_attributes(&file))
    }

    /// A typed `dos` snapshot; the `dos` view must be configured.
    pub fn read_dos_attributes(&self, path: &EntryPath) -> Result<DosFileAttributes> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.attrs.dos_attributes(&file)
    }

    /// A typed `posix` snapshot; the `posix` view must be configured.
    pub fn read_posix_attributes(&self, path: &EntryPath) -> Result<PosixFileAttributes> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        self.attrs.posix_attributes(&file)
    }

    /// The hard-link count of the file at `path`.
    pub fn link_count(&self, path: &EntryPath) -> Result<u32> {
        self.state.check_open()?;
        let (resolved, _) = self.lookup_existing(path, true)?;
        Ok(resolved.file.unwrap_or_else(|| unreachable!()).links())
    }

    // ---------- watching ----------

    /// Creates a watch service bound to this filesystem. It closes with
    /// the filesystem's final teardown.
    pub fn new_watch_service(&self) -> Result<Arc<WatchService>> {
        self.state.check_open()?;
        let service = WatchService::new();
        self.watch_services.lock().push(service.clone());
        Ok(service)
    }

    /// Registers the directory at `path` with `service` for `kinds`.
    pub fn watch(
        &self,
        service: &Arc<WatchService>,
        path: &EntryPath,
        kinds: &[EventKind],
    ) -> Result<Arc<WatchKey>> {
        self.state.check_open()?;
        let (resolved, ctx) = self.lookup_existing(path, true)?;
        let file = resolved.file.unwrap_or_else(|| unreachable!());
        if !file.is_directory() {
            return Err(Error::NotDirectory(ctx));
        }
        service.register(file.id(), path.clone(), kinds)
    }

    fn publish(&self, dir: &Arc<File>, kind: EventKind, name: &Name) {
        let services = self.watch_services.lock().clone();
        if services.is_empty() {
            return;
        }
        for service in services {
            for key in service.keys_for(dir.id()) {
                if key.subscribes(kind) {
                    key.post(WatchEvent::new(
                        kind,
                        Some(self.path_service.create_file_name(name.clone())),
                    ));
                    key.signal();
                }
            }
        }
    }
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("path_type", &self.config.path_type())
            .field("open", &self.is_open())
            .field(
                "working_directory",
                &self.path_service.to_string(&self.working_directory.0),
            )
            .finish_non_exhaustive()
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.state.close();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::Config;
    use crate::error::Error;
    use crate::fs::FileSystem;
    use crate::time::FixedTimeSource;

    fn fs() -> FileSystem {
        FileSystem::with_time_source(Config::unix(), Arc::new(FixedTimeSource::at_epoch()))
            .unwrap()
    }

    #[test]
    fn working_directory_is_materialized() {
        let fs = fs();
        let wd = fs.path("/work").unwrap();
        assert!(fs.exists(&wd));
        // Relative paths resolve against it.
        let rel = fs.path("sub").unwrap();
        fs.create_directory(&rel).unwrap();
        assert!(fs.exists(&fs.path("/work/sub").unwrap()));
    }

    #[test]
    fn lookup_through_dot_and_dotdot() {
        let fs = fs();
        fs.create_directory(&fs.path("/a").unwrap()).unwrap();
        fs.create_directory(&fs.path("/a/b").unwrap()).unwrap();
        assert!(fs.exists(&fs.path("/a/./b").unwrap()));
        assert!(fs.exists(&fs.path("/a/b/..").unwrap()));
        assert!(fs.exists(&fs.path("/a/b/../..").unwrap()));
        assert!(!fs.exists(&fs.path("/a/c/..").unwrap()));
    }

    #[test]
    fn missing_intermediate_is_no_such_file() {
        let fs = fs();
        let err = fs.create_directory(&fs.path("/missing/dir").unwrap()).unwrap_err();
        assert!(matches!(err, Error::NoSuchFile(_)));
    }

    #[test]
    fn file_as_intermediate_is_not_directory() {
        let fs = fs();
        fs.create_file(&fs.path("/f").unwrap()).unwrap();
        let err = fs.create_directory(&fs.path("/f/dir").unwrap()).unwrap_err();
        assert!(matches!(err, Error::NotDirectory(_)));
    }

    #[test]
    fn symlink_loop_detected() {
        let fs = fs();
        fs.create_symbolic_link(&fs.path("/a").unwrap(), &fs.path("/b").unwrap())
            .unwrap();
        fs.create_symbolic_link(&fs.path("/b").unwrap(), &fs.path("/a").unwrap())
            .unwrap();
        let err = fs
            .new_input_stream(&fs.path("/a").unwrap(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Loop(_)));
    }

    #[test]
    fn closed_filesystem_rejects_operations() {
        let fs = fs();
        let p = fs.path("/x").unwrap();
        fs.close();
        assert!(matches!(
            fs.create_file(&p),
            Err(Error::ClosedFileSystem)
        ));
        assert!(!fs.exists(&fs.path("/work").unwrap()));
        assert!(!fs.is_open());
        // Idempotent.
        fs.close();
    }

    #[test]
    fn real_path_folds_links_and_dots() {
        let fs = fs();
        fs.create_directory(&fs.path("/a").unwrap()).unwrap();
        fs.create_directory(&fs.path("/a/b").unwrap()).unwrap();
        fs.create_file(&fs.path("/a/b/f").unwrap()).unwrap();
        fs.create_symbolic_link(&fs.path("/link").unwrap(), &fs.path("/a/b").unwrap())
            .unwrap();

        let svc = fs.path_service();
        let real = fs.to_real_path(&fs.path("/link/f").unwrap()).unwrap();
        assert_eq!("/a/b/f", svc.to_string(&real));
        let real = fs.to_real_path(&fs.path("/a/./b/../b").unwrap()).unwrap();
        assert_eq!("/a/b", svc.to_string(&real));
        let real = fs.to_real_path(&fs.path("").unwrap()).unwrap();
        assert_eq!("/work", svc.to_string(&real));
    }

    #[test]
    fn subtree_move_rejected() {
        let fs = fs();
        fs.create_directory(&fs.path("/a").unwrap()).unwrap();
        fs.create_directory(&fs.path("/a/b").unwrap()).unwrap();
        let err = fs
            .rename(&fs.path("/a").unwrap(), &fs.path("/a/b/c").unwrap(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }
}
