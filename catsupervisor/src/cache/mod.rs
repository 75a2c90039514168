/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cache-allocation driver: translates class-of-service decisions into the
//! hardware's pseudo-filesystem state.
//!
//! The real backing medium is the kernel's resctrl mount (commonly
//! `/sys/fs/resctrl`), a directory tree whose reads and writes are syscalls
//! rather than on-disk storage. [`FsCacheDriver`] treats any root path the
//! same way, which is what makes it directly testable against a
//! [`tempfile::TempDir`] instead of requiring CAT-capable hardware.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CacheError;

/// Static description of the cache partition surface, discovered once at
/// `init()` and never mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    /// Full cache-way bitmask (e.g. `0xFFFFF` for 20 ways).
    pub cbm_mask: u64,
    /// Minimum contiguous width a mask may have.
    pub min_cbm_bits: u32,
    /// Number of available class-of-service slots.
    pub num_closids: usize,
}

/// Contract every cache-allocation backend must satisfy.
pub trait CacheDriver {
    fn init(&mut self) -> Result<(), CacheError>;
    fn reset(&mut self) -> Result<(), CacheError>;
    fn set_ways(&mut self, cos: usize, mask: u64) -> Result<(), CacheError>;
    fn get_ways(&self, cos: usize) -> Result<u64, CacheError>;
    fn assign_cpu(&mut self, cos: usize, cpu: u32) -> Result<(), CacheError>;
    fn assign_task(&mut self, cos: usize, pid: i32) -> Result<(), CacheError>;
    fn cos_of_cpu(&self, cpu: u32) -> Result<usize, CacheError>;
    fn cos_of_task(&self, pid: i32) -> Result<usize, CacheError>;
    fn max_cos(&self) -> Result<usize, CacheError>;
    fn info(&self) -> Result<CacheInfo, CacheError>;
}

/// Verify a mask is a contiguous run of 1-bits of width >= `min_cbm_bits` and
/// a subset of `cbm_mask`. Never returns `Ok` for an invalid mask — callers
/// must not write such a mask to hardware.
fn validate_mask(mask: u64, info: &CacheInfo) -> Result<(), &'static str> {
    if mask == 0 {
        return Err("mask is empty");
    }
    if mask & !info.cbm_mask != 0 {
        return Err("mask is not a subset of cbm_mask");
    }
    let tz = mask.trailing_zeros();
    let shifted = mask >> tz;
    if shifted & (shifted + 1) != 0 {
        return Err("mask bits are not contiguous");
    }
    if mask.count_ones() < info.min_cbm_bits {
        return Err("mask is narrower than min_cbm_bits");
    }
    Ok(())
}

fn parse_schemata_line(s: &str) -> Option<u64> {
    let (_, hex) = s.trim().split_once('=')?;
    u64::from_str_radix(hex.trim(), 16).ok()
}

fn read_hex_or_decimal(path: &Path) -> Result<u64, CacheError> {
    let raw = fs::read_to_string(path).map_err(|source| CacheError::DriverIo {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = raw.trim();
    let value = trimmed
        .strip_prefix("0x")
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .or_else(|| trimmed.parse::<u64>().ok())
        .ok_or_else(|| CacheError::DriverIo {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "not an integer"),
        })?;
    Ok(value)
}

/// Pseudo-filesystem-backed [`CacheDriver`].
///
/// Layout under `root`:
/// ```text
/// root/schemata, root/cpus, root/tasks        – COS 0 (default)
/// root/1/{schemata,cpus,tasks} .. root/{N-1}/… – COS 1..N-1
/// root/info/L3/{cbm_mask,min_cbm_bits,num_closids}
/// ```
pub struct FsCacheDriver {
    root: PathBuf,
    info: Option<CacheInfo>,
}

impl FsCacheDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCacheDriver {
            root: root.into(),
            info: None,
        }
    }

    fn info_or_err(&self) -> Result<CacheInfo, CacheError> {
        self.info.ok_or(CacheError::NotInitialized)
    }

    /// Maps a COS id to its directory: COS 0 is the root itself.
    fn cos_dir(&self, cos: usize) -> PathBuf {
        if cos == 0 {
            self.root.clone()
        } else {
            self.root.join(cos.to_string())
        }
    }

    fn schemata_path(&self, cos: usize) -> PathBuf {
        self.cos_dir(cos).join("schemata")
    }

    fn cpus_path(&self, cos: usize) -> PathBuf {
        self.cos_dir(cos).join("cpus")
    }

    fn tasks_path(&self, cos: usize) -> PathBuf {
        self.cos_dir(cos).join("tasks")
    }

    fn write_schemata(&self, cos: usize, mask: u64) -> Result<(), CacheError> {
        let path = self.schemata_path(cos);
        fs::write(&path, format!("L3:0={:x}\n", mask)).map_err(|source| CacheError::DriverIo {
            path,
            source,
        })
    }

    fn read_cpus_mask(&self, cos: usize) -> Result<u64, CacheError> {
        let path = self.cpus_path(cos);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Ok(0)
                } else {
                    u64::from_str_radix(trimmed, 16).map_err(|_| CacheError::DriverIo {
                        path: path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "cpus file did not contain a hex mask",
                        ),
                    })
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(CacheError::DriverIo { path, source }),
        }
    }

    fn write_cpus_mask(&self, cos: usize, mask: u64) -> Result<(), CacheError> {
        let path = self.cpus_path(cos);
        fs::write(&path, format!("{:x}\n", mask)).map_err(|source| CacheError::DriverIo {
            path,
            source,
        })
    }

    fn read_task_pids(&self, cos: usize) -> Result<Vec<i32>, CacheError> {
        let path = self.tasks_path(cos);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(raw
                .lines()
                .filter_map(|line| line.trim().parse::<i32>().ok())
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(CacheError::DriverIo { path, source }),
        }
    }

    fn write_task_pids(&self, cos: usize, pids: &[i32]) -> Result<(), CacheError> {
        let path = self.tasks_path(cos);
        let body = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, body).map_err(|source| CacheError::DriverIo { path, source })
    }

    fn create_cos_dir(&self, cos: usize) -> Result<(), CacheError> {
        let dir = self.cos_dir(cos);
        fs::create_dir_all(&dir).map_err(|source| CacheError::DriverIo {
            path: dir,
            source,
        })
    }
}

impl CacheDriver for FsCacheDriver {
    fn init(&mut self) -> Result<(), CacheError> {
        let l3 = self.root.join("info").join("L3");
        let cbm_mask = read_hex_or_decimal(&l3.join("cbm_mask"))?;
        let min_cbm_bits = read_hex_or_decimal(&l3.join("min_cbm_bits"))? as u32;
        let num_closids = read_hex_or_decimal(&l3.join("num_closids"))? as usize;

        self.info = Some(CacheInfo {
            cbm_mask,
            min_cbm_bits,
            num_closids,
        });
        debug!(cbm_mask, min_cbm_bits, num_closids, "cache driver initialized");
        self.reset()
    }

    fn reset(&mut self) -> Result<(), CacheError> {
        let info = self.info_or_err()?;

        // Snapshot existing non-default cos dirs before deleting any of
        // them — iterating a kernel pseudo-FS across deletions is unsafe.
        let existing: Vec<usize> = fs::read_dir(&self.root)
            .map_err(|source| CacheError::DriverIo {
                path: self.root.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect();

        for cos in existing {
            let dir = self.cos_dir(cos);
            if dir.is_dir() {
                fs::remove_dir_all(&dir).map_err(|source| CacheError::DriverIo {
                    path: dir,
                    source,
                })?;
            }
        }

        for cos in 1..info.num_closids {
            self.create_cos_dir(cos)?;
        }
        for cos in 0..info.num_closids {
            self.write_schemata(cos, info.cbm_mask)?;
            self.write_cpus_mask(cos, 0)?;
            self.write_task_pids(cos, &[])?;
        }
        Ok(())
    }

    fn set_ways(&mut self, cos: usize, mask: u64) -> Result<(), CacheError> {
        let info = self.info_or_err()?;
        if cos >= info.num_closids {
            return Err(CacheError::CosOutOfRange {
                cos,
                max_cos: info.num_closids,
            });
        }
        validate_mask(mask, &info).map_err(|reason| CacheError::InvalidMask {
            cos,
            mask,
            reason,
        })?;
        self.write_schemata(cos, mask)
    }

    fn get_ways(&self, cos: usize) -> Result<u64, CacheError> {
        let info = self.info_or_err()?;
        if cos >= info.num_closids {
            return Err(CacheError::CosOutOfRange {
                cos,
                max_cos: info.num_closids,
            });
        }
        let path = self.schemata_path(cos);
        let raw = fs::read_to_string(&path).map_err(|source| CacheError::DriverIo {
            path: path.clone(),
            source,
        })?;
        parse_schemata_line(&raw).ok_or(CacheError::DriverIo {
            path,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed schemata line"),
        })
    }

    fn assign_cpu(&mut self, cos: usize, cpu: u32) -> Result<(), CacheError> {
        let info = self.info_or_err()?;
        if cos >= info.num_closids {
            return Err(CacheError::CosOutOfRange {
                cos,
                max_cos: info.num_closids,
            });
        }
        for other in 1..info.num_closids {
            if other == cos {
                continue;
            }
            let mask = self.read_cpus_mask(other)?;
            if (mask >> cpu) & 1 == 1 {
                self.write_cpus_mask(other, mask & !(1u64 << cpu))?;
            }
        }
        if cos != 0 {
            let mask = self.read_cpus_mask(cos)?;
            self.write_cpus_mask(cos, mask | (1u64 << cpu))?;
        }
        Ok(())
    }

    fn assign_task(&mut self, cos: usize, pid: i32) -> Result<(), CacheError> {
        let info = self.info_or_err()?;
        if cos >= info.num_closids {
            return Err(CacheError::CosOutOfRange {
                cos,
                max_cos: info.num_closids,
            });
        }
        for other in 0..info.num_closids {
            if other == cos {
                continue;
            }
            let mut pids = self.read_task_pids(other)?;
            let before = pids.len();
            pids.retain(|&p| p != pid);
            if pids.len() != before {
                self.write_task_pids(other, &pids)?;
            }
        }
        let mut pids = self.read_task_pids(cos)?;
        if !pids.contains(&pid) {
            pids.push(pid);
            self.write_task_pids(cos, &pids)?;
        }
        Ok(())
    }

    fn cos_of_cpu(&self, cpu: u32) -> Result<usize, CacheError> {
        let info = self.info_or_err()?;
        for cos in 1..info.num_closids {
            let mask = self.read_cpus_mask(cos)?;
            if (mask >> cpu) & 1 == 1 {
                return Ok(cos);
            }
        }
        Ok(0)
    }

    fn cos_of_task(&self, pid: i32) -> Result<usize, CacheError> {
        let info = self.info_or_err()?;
        for cos in 1..info.num_closids {
            if self.read_task_pids(cos)?.contains(&pid) {
                return Ok(cos);
            }
        }
        Ok(0)
    }

    fn max_cos(&self) -> Result<usize, CacheError> {
        Ok(self.info_or_err()?.num_closids)
    }

    fn info(&self) -> Result<CacheInfo, CacheError> {
        self.info_or_err()
    }
}

/// Seed the `info/L3` tree a test pseudo-FS needs before `init()` can run.
#[cfg(test)]
fn seed_info(root: &Path, cbm_mask: u64, min_cbm_bits: u32, num_closids: usize) {
    let l3 = root.join("info").join("L3");
    fs::create_dir_all(&l3).unwrap();
    fs::write(l3.join("cbm_mask"), format!("{:x}", cbm_mask)).unwrap();
    fs::write(l3.join("min_cbm_bits"), min_cbm_bits.to_string()).unwrap();
    fs::write(l3.join("num_closids"), num_closids.to_string()).unwrap();
}
