// Heuristic analysis: entropy, PE structure, packer/suspicious strings,
// and shellcode byte patterns. Every predicate fails closed: a read error
// yields "not suspicious" rather than propagating, since these are
// best-effort signals layered on top of signature matching.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Closed list of high-risk file extensions (without the leading dot).
pub const HIGH_RISK_EXTENSIONS: &[&str] = &[
    "exe", "dll", "scr", "bat", "cmd", "vbs", "js", "ws", "wsf", "wsh", "ps1", "msi", "msp",
    "hta", "jar", "py", "pyw", "com", "msc", "cpl", "reg", "inf", "scf", "url", "lnk", "job",
    "jse", "pif", "application",
];

/// Closed list of packer magic tokens.
pub const PACKER_TOKENS: &[&str] = &[
    "UPX!", "ASPack", "FSG!", "PECompact", "MEW", "MPRESS", "PACK", "Themida", "Obsidium",
    "VMProtect",
];

const PROCESS_PATTERNS: &[&str] = &[
    "CreateRemoteThread",
    "WriteProcessMemory",
    "VirtualAllocEx",
    "OpenProcess",
    "CreateProcess",
    "ShellExecute",
    "WinExec",
    "SetWindowsHookEx",
    "GetAsyncKeyState",
    "RegisterHotKey",
];

const NETWORK_PATTERNS: &[&str] = &[
    "WSAStartup",
    "socket",
    "connect",
    "InternetOpen",
    "HttpSendRequest",
    "URLDownloadToFile",
    "InternetReadFile",
];

const FILESYSTEM_PATTERNS: &[&str] = &[
    "CreateFile",
    "WriteFile",
    "CopyFile",
    "MoveFile",
    "DeleteFile",
    "RegCreateKey",
    "RegSetValue",
];

const ANTI_ANALYSIS_PATTERNS: &[&str] = &[
    "IsDebuggerPresent",
    "CheckRemoteDebuggerPresent",
    "OutputDebugString",
    "GetTickCount",
    "QueryPerformanceCounter",
];

const INJECTION_PATTERNS: &[&str] = &[
    "VirtualProtect",
    "VirtualAlloc",
    "LoadLibrary",
    "GetProcAddress",
    "CreateThread",
    "CreateMutex",
];

const SPYWARE_PATTERNS: &[&str] = &[
    "GetForegroundWindow",
    "GetKeyState",
    "GetClipboardData",
    "SetClipboardData",
    "GetWindowText",
    "BitBlt",
    "GetDC",
];

const RANSOMWARE_PATTERNS: &[&str] = &[
    "CryptEncrypt",
    "CryptDecrypt",
    "CryptGenKey",
    "BCryptEncrypt",
    "BCryptDecrypt",
    "wincrypt.h",
];

const BASE64_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";
const BASE64_RUN_THRESHOLD: usize = 100;

/// Byte patterns searched for by the shellcode scan (C7), over the first
/// 8 KiB of a file.
const SHELLCODE_PATTERNS: &[&[u8]] = &[
    &[0x33, 0xC0, 0x50, 0x68], // XOR EAX, EAX; PUSH EAX; PUSH
    &[0x55, 0x8B, 0xEC],       // PUSH EBP; MOV EBP, ESP
    &[0x90, 0x90, 0x90, 0x90], // NOP sled
    &[0xE8, 0x00, 0x00, 0x00], // CALL $+5
    &[0xEB],                   // JMP SHORT
    &[0xFF, 0xD0],             // CALL EAX
    &[0xB8, 0x00, 0x00, 0x00], // MOV EAX, immediate
];

/// Byte-frequency Shannon entropy of a file's full content, in bits per
/// byte. Empty files return 0.
pub fn entropy(path: &Path) -> f64 {
    let Ok(bytes) = fs::read(path) else {
        return 0.0;
    };
    entropy_of(&bytes)
}

/// Shannon entropy of a byte slice.
pub fn entropy_of(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }

    let mut frequencies = [0u64; 256];
    for &b in bytes {
        frequencies[b as usize] += 1;
    }

    let len = bytes.len() as f64;
    let mut result = 0.0;
    for &freq in &frequencies {
        if freq == 0 {
            continue;
        }
        let probability = freq as f64 / len;
        result -= probability * probability.log2();
    }
    result
}

/// Minimal DOS + NT header fields needed to flag a suspicious PE.
struct PeFlags {
    dll_characteristic: bool,
    unknown_subsystem: bool,
    dynamic_base: bool,
}

const IMAGE_FILE_DLL: u16 = 0x2000;
const IMAGE_SUBSYSTEM_UNKNOWN: u16 = 0;
const IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE: u16 = 0x0040;

/// Opens the file, reads the DOS header, and if `e_magic == "MZ"` follows
/// `e_lfanew` to the NT headers. Flags the file if the DLL characteristic
/// bit is set, the subsystem is UNKNOWN, or the dynamic-base
/// characteristic bit is set. Non-PE files and read errors are not
/// suspicious; no error is ever propagated from this check.
pub fn is_suspicious_pe(path: &Path) -> bool {
    inspect_pe(path).map(|flags| {
        flags.dll_characteristic || flags.unknown_subsystem || flags.dynamic_base
    }).unwrap_or(false)
}

fn inspect_pe(path: &Path) -> Option<PeFlags> {
    let mut file = fs::File::open(path).ok()?;

    let mut dos_header = [0u8; 64];
    file.read_exact(&mut dos_header).ok()?;
    if &dos_header[0..2] != b"MZ" {
        return None;
    }

    let e_lfanew = u32::from_le_bytes(dos_header[60..64].try_into().ok()?);
    file.seek(SeekFrom::Start(e_lfanew as u64)).ok()?;

    let mut nt_signature = [0u8; 4];
    file.read_exact(&mut nt_signature).ok()?;
    if &nt_signature != b"PE\0\0" {
        return None;
    }

    // File header: 20 bytes (Machine, NumberOfSections, TimeDateStamp,
    // PointerToSymbolTable, NumberOfSymbols, SizeOfOptionalHeader,
    // Characteristics).
    let mut file_header = [0u8; 20];
    file.read_exact(&mut file_header).ok()?;
    let characteristics = u16::from_le_bytes(file_header[18..20].try_into().ok()?);
    let dll_characteristic = characteristics & IMAGE_FILE_DLL != 0;

    let size_of_optional = u16::from_le_bytes(file_header[16..18].try_into().ok()?);
    if size_of_optional == 0 {
        return Some(PeFlags {
            dll_characteristic,
            unknown_subsystem: false,
            dynamic_base: false,
        });
    }

    // Optional header: Magic(2) follows; Subsystem and DllCharacteristics
    // live at fixed offsets for both PE32 (0x10b) and PE32+ (0x20b) since
    // everything before them (StandardFields + WindowsFields up through
    // SizeOfHeapCommit) differs only in field width, not in the ordering
    // we rely on here, so read generously and bounds-check.
    let mut optional_header = vec![0u8; size_of_optional as usize];
    file.read_exact(&mut optional_header).ok()?;
    if optional_header.len() < 2 {
        return Some(PeFlags {
            dll_characteristic,
            unknown_subsystem: false,
            dynamic_base: false,
        });
    }
    // Subsystem sits at offset 68 in both PE32 and PE32+: PE32+ drops the
    // 4-byte BaseOfData field but widens ImageBase from 4 to 8 bytes, so
    // the two differences cancel out and every field from SectionAlignment
    // onward lands at the same offset in either form.
    let subsystem_offset = 68;
    let dll_characteristics_offset = subsystem_offset + 2;

    if optional_header.len() < dll_characteristics_offset + 2 {
        return Some(PeFlags {
            dll_characteristic,
            unknown_subsystem: false,
            dynamic_base: false,
        });
    }

    let subsystem = u16::from_le_bytes(
        optional_header[subsystem_offset..subsystem_offset + 2]
            .try_into()
            .ok()?,
    );
    let dll_characteristics = u16::from_le_bytes(
        optional_header[dll_characteristics_offset..dll_characteristics_offset + 2]
            .try_into()
            .ok()?,
    );

    Some(PeFlags {
        dll_characteristic,
        unknown_subsystem: subsystem == IMAGE_SUBSYSTEM_UNKNOWN,
        dynamic_base: dll_characteristics & IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE != 0,
    })
}

/// True if the file's bytes contain any known packer magic token.
pub fn has_packer_signature(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    contains_any_token(&bytes, PACKER_TOKENS)
}

/// True if the file contains a token from any of the seven suspicious-API
/// categories, or a base64-alphabet run longer than 100 bytes.
pub fn has_suspicious_strings(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };

    if has_base64_run(&bytes) {
        return true;
    }

    contains_any_token(&bytes, PROCESS_PATTERNS)
        || contains_any_token(&bytes, NETWORK_PATTERNS)
        || contains_any_token(&bytes, FILESYSTEM_PATTERNS)
        || contains_any_token(&bytes, ANTI_ANALYSIS_PATTERNS)
        || contains_any_token(&bytes, INJECTION_PATTERNS)
        || contains_any_token(&bytes, SPYWARE_PATTERNS)
        || contains_any_token(&bytes, RANSOMWARE_PATTERNS)
}

fn contains_any_token(haystack: &[u8], tokens: &[&str]) -> bool {
    tokens.iter().any(|t| contains_subslice(haystack, t.as_bytes()))
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn has_base64_run(bytes: &[u8]) -> bool {
    let mut run = 0usize;
    for &b in bytes {
        if BASE64_ALPHABET.contains(&b) {
            run += 1;
            if run > BASE64_RUN_THRESHOLD {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Scans the first 8 KiB of a file for any of the closed shellcode byte
/// patterns. Best-effort: read errors yield `false`.
pub fn has_shellcode_pattern(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut head = vec![0u8; crate::config::SCAN_BUFFER_SIZE];
    let Ok(read) = file.read(&mut head) else {
        return false;
    };
    head.truncate(read);
    has_shellcode_pattern_in(&head)
}

fn has_shellcode_pattern_in(bytes: &[u8]) -> bool {
    SHELLCODE_PATTERNS
        .iter()
        .any(|pattern| contains_subslice(bytes, pattern))
}
