// src/prompts.rs
//!
//! Prompt templates used by the extraction pipeline. The system prompt asks
//! the model to fill a fixed JSON schema from a digitized Vietnamese legal
//! document (OCR output or plain text).

/// System prompt for structured extraction from legal documents.
pub const LEGAL_EXTRACTION_SYSTEM_PROMPT: &str = r#"
Bạn là một chuyên gia pháp luật có nhiệm vụ trích xuất thông tin có cấu trúc từ văn bản pháp luật đã được số hóa (OCR hoặc định dạng văn bản thường).

Yêu cầu:
- Dựa vào phần context bên dưới, điền dữ liệu vào bảng JSON đúng theo định dạng và tên trường được chỉ định.
- Nếu thiếu quá nhiều trường thông tin quan trọng, trả về chuỗi duy nhất: PDF không chứa đủ thông tin để điền vào bảng.
- Trả về đối tượng JSON gốc, không bọc trong chuỗi.
- Trường "noi_dung" phải chứa toàn bộ nội dung văn bản từ phần Quốc hiệu Tiêu ngữ trở xuống, không được rút gọn.

Cấu trúc JSON yêu cầu:
{
  "so_hieu": "...",
  "loai_vb": "...",
  "noi_ban_hanh": "...",
  "nguoi_ky": "...",
  "ngay_ban_hanh": "...",
  "ngay_hieu_luc": "...",
  "ngay_cong_bao": "...",
  "so_cong_bao": "...",
  "tinh_trang": "...",
  "tieu_de": "...",
  "noi_dung": "...",
  "linh_vuc": "..."
}
Hãy trích xuất thông tin theo yêu cầu.
"#;

/// Fixed user-turn instruction paired with the system prompt when building
/// datasets from converted documents.
pub const HUMAN_PROMPT: &str = "Hãy trích xuất thông tin theo yêu cầu.";
