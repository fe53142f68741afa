//! 上传文件模型
//!
//! 上传的文件在进入管道前已经落盘到临时目录，输入数据里只保存描述对象：
//! `{"name", "type", "size", "tmp_name", "error"}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// 上传成功
pub const UPLOAD_ERR_OK: u8 = 0;
/// 超出服务器允许的大小
pub const UPLOAD_ERR_INI_SIZE: u8 = 1;
/// 超出表单声明的大小
pub const UPLOAD_ERR_FORM_SIZE: u8 = 2;
/// 只上传了一部分
pub const UPLOAD_ERR_PARTIAL: u8 = 3;
/// 没有文件
pub const UPLOAD_ERR_NO_FILE: u8 = 4;

/// 上传文件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// 客户端提供的原始文件名
    pub name: String,
    /// 客户端声明的内容类型
    #[serde(rename = "type", default)]
    pub mime: String,
    #[serde(default)]
    pub size: u64,
    /// 临时文件路径
    #[serde(default)]
    pub tmp_name: String,
    #[serde(default)]
    pub error: u8,
}

impl UploadedFile {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "type": self.mime,
            "size": self.size,
            "tmp_name": self.tmp_name,
            "error": self.error,
        })
    }

    pub fn is_missing(&self) -> bool {
        self.error == UPLOAD_ERR_NO_FILE || (self.name.is_empty() && self.size == 0)
    }

    /// 小写扩展名
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// 读取临时文件头部判断实际内容类型
    pub fn sniff_mime(&self) -> std::io::Result<&'static str> {
        let mut head = [0u8; 512];
        let mut file = std::fs::File::open(&self.tmp_name)?;
        let read = file.read(&mut head)?;
        Ok(sniff(&head[..read]))
    }
}

/// 根据魔数判断内容类型
pub fn sniff(head: &[u8]) -> &'static str {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        "image/webp"
    } else if head.starts_with(b"BM") {
        "image/bmp"
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if !head.is_empty() && std::str::from_utf8(head).is_ok() {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

/// 内容类型允许的扩展名
pub fn extensions_for(mime: &str) -> &'static [&'static str] {
    match mime {
        "image/jpeg" => &["jpg", "jpeg"],
        "image/png" => &["png"],
        "image/gif" => &["gif"],
        "image/webp" => &["webp"],
        "image/bmp" => &["bmp"],
        "application/pdf" => &["pdf"],
        "text/plain" => &["txt"],
        _ => &[],
    }
}
