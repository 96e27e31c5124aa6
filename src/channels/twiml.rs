//! Minimal TwiML rendering for the Twilio webhook responses.

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// `<Message>` reply for the WhatsApp webhook.
pub fn message_response(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(body)
    )
}

/// `<Gather>` that collects DTMF digits after speaking a prompt. A
/// gather timeout falls through to the fallback `<Say>` and hangs up
/// rather than redirect looping.
pub fn gather_digits_response(prompt: &str, locale: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
         <Gather input=\"dtmf\" numDigits=\"1\" timeout=\"10\">\
         <Say language=\"{0}\">{1}</Say>\
         </Gather>\
         <Say language=\"{0}\">I didn't receive your selection. Please call back and try again.</Say>\
         <Hangup/></Response>",
        escape_xml(locale),
        escape_xml(prompt)
    )
}

/// `<Gather>` that records speech after speaking a prompt, with the
/// same timeout fallback as the digit gather.
pub fn gather_speech_response(prompt: &str, locale: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
         <Gather input=\"speech\" speechTimeout=\"3\" timeout=\"10\" finishOnKey=\"#\" language=\"{0}\">\
         <Say language=\"{0}\">{1}</Say>\
         </Gather>\
         <Say language=\"{0}\">I didn't hear anything. Please call back and speak clearly to ask your farming question.</Say>\
         <Hangup/></Response>",
        escape_xml(locale),
        escape_xml(prompt)
    )
}

/// Speak a farewell and hang up.
pub fn say_hangup_response(text: &str, locale: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
         <Say language=\"{}\">{}</Say><Hangup/></Response>",
        escape_xml(locale),
        escape_xml(text)
    )
}
