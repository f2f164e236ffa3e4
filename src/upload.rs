use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use log::warn;

/// Turns an uploaded sidebar file into the user message it contributes to the
/// conversation. Never fails: problems become the message text.
pub fn process_uploaded_file(file_name: &str, mime_type: &str, data_base64: &str) -> String {
    let bytes = match STANDARD.decode(data_base64.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Could not decode upload '{}': {}", file_name, e);
            return format!("An error occurred while processing the file: {}", e);
        }
    };

    if mime_type == "text/plain" {
        match String::from_utf8(bytes) {
            Ok(content) => format!("Uploaded text file content:\n\n{}", content),
            Err(e) => {
                warn!("Upload '{}' is not valid UTF-8", file_name);
                format!("An error occurred while processing the file: {}", e)
            }
        }
    } else if mime_type.starts_with("image/") {
        "An image was uploaded. Use image analysis to ask about it.".to_string()
    } else {
        format!("Unsupported file type: {}", mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_files_are_inlined() {
        let data = STANDARD.encode("line one\nline two");
        let message = process_uploaded_file("notes.txt", "text/plain", &data);
        assert_eq!(message, "Uploaded text file content:\n\nline one\nline two");
    }

    #[test]
    fn images_point_to_the_analyzer() {
        let data = STANDARD.encode([0x89u8, 0x50, 0x4e, 0x47]);
        let message = process_uploaded_file("cat.png", "image/png", &data);
        assert!(message.contains("image analysis"));
    }

    #[test]
    fn other_types_and_bad_payloads_become_notices() {
        let data = STANDARD.encode("%PDF");
        assert_eq!(
            process_uploaded_file("doc.pdf", "application/pdf", &data),
            "Unsupported file type: application/pdf"
        );
        assert!(process_uploaded_file("x.txt", "text/plain", "***").starts_with("An error occurred"));

        let invalid_utf8 = STANDARD.encode([0xffu8, 0xfe]);
        assert!(process_uploaded_file("x.txt", "text/plain", &invalid_utf8).starts_with("An error occurred"));
    }
}
