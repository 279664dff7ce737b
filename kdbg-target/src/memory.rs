//! メモリアクセス機能

use crate::Result;
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read as _, Seek, SeekFrom, Write as _};

const PAGE_SIZE: usize = 4096;

/// 文字列読み取り時の1回あたりの読み取りサイズ
const STRING_CHUNK: usize = 64;

/// メモリアクセス
pub struct Memory {
    pid: Pid,
}

impl Memory {
    /// メモリアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    /// メモリからデータを読み取る
    ///
    /// /proc/pid/memを使用し、EIOで失敗した場合はPTRACE_PEEKDATAにフォールバックする。
    pub fn read(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        match self.read_via_proc_mem(addr, size) {
            Ok(data) => Ok(data),
            Err(e) => {
                let is_eio = e
                    .downcast_ref::<std::io::Error>()
                    .and_then(|io_err| io_err.raw_os_error())
                    == Some(nix::libc::EIO);
                if is_eio {
                    return self.read_via_ptrace(addr, size);
                }
                Err(e)
            }
        }
    }

    fn read_via_proc_mem(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        let mem_path = self.mem_path();
        let mut file = File::open(&mem_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", mem_path, e))?;

        file.seek(SeekFrom::Start(addr as u64))?;

        let mut buffer = vec![0u8; size];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// PTRACE_PEEKDATAでword単位に読み取る
    pub fn read_via_ptrace(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        use nix::sys::ptrace;

        let word_size = std::mem::size_of::<usize>();
        let mut data = Vec::with_capacity(size + word_size);

        for offset in (0..size).step_by(word_size) {
            let word_addr = (addr + offset) as *mut std::ffi::c_void;
            let word = ptrace::read(self.pid, word_addr).map_err(|e| {
                anyhow::anyhow!("Failed to read via ptrace at 0x{:x}: {}", addr + offset, e)
            })?;
            data.extend_from_slice(&word.to_ne_bytes());
        }

        data.truncate(size);
        Ok(data)
    }

    /// メモリにデータを書き込む
    pub fn write(&self, addr: usize, data: &[u8]) -> Result<()> {
        let mem_path = self.mem_path();
        let mut file = OpenOptions::new()
            .write(true)
            .open(&mem_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {} for writing: {}", mem_path, e))?;

        file.seek(SeekFrom::Start(addr as u64))
            .map_err(|e| anyhow::anyhow!("Failed to seek to address 0x{:x}: {}", addr, e))?;
        file.write_all(data).map_err(|e| {
            anyhow::anyhow!("Failed to write {} bytes to 0x{:x}: {}", data.len(), addr, e)
        })?;

        Ok(())
    }

    /// 指定サイズ（1, 2, 4, 8バイト）の符号なし整数を読み取る（リトルエンディアン）
    pub fn read_uint(&self, addr: usize, size: usize) -> Result<u64> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(anyhow::anyhow!("Unsupported integer size: {} bytes", size));
        }
        let bytes = self.read(addr, size)?;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// u64値を読み取る
    pub fn read_u64(&self, addr: usize) -> Result<u64> {
        self.read_uint(addr, 8)
    }

    /// u64値を書き込む
    pub fn write_u64(&self, addr: usize, value: u64) -> Result<()> {
        self.write(addr, &value.to_le_bytes())
    }

    /// u8値を読み取る
    pub fn read_u8(&self, addr: usize) -> Result<u8> {
        Ok(self.read(addr, 1)?[0])
    }

    /// u8値を書き込む
    pub fn write_u8(&self, addr: usize, value: u8) -> Result<()> {
        self.write(addr, &[value])
    }

    /// NUL終端文字列を読み取る
    ///
    /// ページ境界をまたがないように小さく区切って読むため、文字列の直後が
    /// 未マップ領域でも失敗しない。`max_len`バイト以内にNULがなければ
    /// そこで切り詰める。UTF-8として不正なバイトは置換文字になる。
    pub fn read_cstring(&self, addr: usize, max_len: usize) -> Result<String> {
        let mut bytes = Vec::new();
        let mut cursor = addr;

        while bytes.len() < max_len {
            let to_page_end = PAGE_SIZE - (cursor % PAGE_SIZE);
            let chunk = STRING_CHUNK.min(to_page_end).min(max_len - bytes.len());
            let data = self.read(cursor, chunk)?;

            if let Some(nul) = data.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&data[..nul]);
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }

            bytes.extend_from_slice(&data);
            cursor += chunk;
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 実行可能ファイルのロードベースを取得する
    ///
    /// /proc/pid/maps上の最初の実行可能セグメントの開始アドレスから
    /// ファイルオフセットを引いた値を返す。
    pub fn get_base_address(&self) -> Result<usize> {
        let maps_path = format!("/proc/{}/maps", self.pid);
        let file = File::open(&maps_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", maps_path, e))?;

        for line in BufReader::new(file).lines() {
            let line = line?;
            // "address perms offset dev inode pathname"
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                continue;
            }

            let Some((start, _end)) = parts[0].split_once('-') else {
                continue;
            };

            if parts[1].chars().nth(2) == Some('x') {
                let start = usize::from_str_radix(start, 16)
                    .map_err(|e| anyhow::anyhow!("Failed to parse base address: {}", e))?;
                let offset = usize::from_str_radix(parts[2], 16)
                    .map_err(|e| anyhow::anyhow!("Failed to parse segment offset: {}", e))?;
                return Ok(start - offset);
            }
        }

        Err(anyhow::anyhow!("Could not find executable segment in memory mappings"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static GREETING: [u8; 12] = *b"hello\0world\0";

    fn own_memory() -> Memory {
        Memory::new(std::process::id() as i32)
    }

    #[test]
    fn test_read_cstring_stops_at_nul() {
        let memory = own_memory();
        let addr = GREETING.as_ptr() as usize;
        assert_eq!(memory.read_cstring(addr, 64).unwrap(), "hello");
        assert_eq!(memory.read_cstring(addr + 6, 64).unwrap(), "world");
    }

    #[test]
    fn test_read_cstring_truncates_at_max_len() {
        let memory = own_memory();
        let addr = GREETING.as_ptr() as usize;
        assert_eq!(memory.read_cstring(addr, 3).unwrap(), "hel");
    }

    #[test]
    fn test_read_uint_sizes() {
        static WORD: u64 = 0x1122_3344_5566_7788;
        let memory = own_memory();
        let addr = &WORD as *const u64 as usize;
        assert_eq!(memory.read_u64(addr).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(memory.read_uint(addr, 4).unwrap(), 0x5566_7788);
        assert_eq!(memory.read_uint(addr, 1).unwrap(), 0x88);
        assert!(memory.read_uint(addr, 3).is_err());
    }
}
