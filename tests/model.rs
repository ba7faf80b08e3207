use anyhow::Result;
use parley::ernie::{
    ChatRequest, ChatResponse, ErnieMessage, FunctionCall, FunctionSchema, MessageRole,
    PropertySchema, StreamAssembler,
};
use parley::model::{Conversation, ConversationSettings, Creativity, KnowledgeItem, Message};
use parley::{Config, ModelError};
use serde_json::json;

#[test]
fn test_conversation_lifecycle() -> Result<()> {
    let mut conversation = Conversation::new("c-42", "Weekend plans")?
        .with_settings(ConversationSettings::default().with_creativity("high")?);
    assert!(conversation.updated_at() >= conversation.created_at());

    for i in 0..5 {
        let len = conversation.messages().len();
        let msg = if i % 2 == 0 {
            Message::user(format!("question {}", i))
        } else {
            Message::assistant(format!("answer {}", i))
        };
        conversation.push_message(msg);
        assert_eq!(conversation.messages().len(), len + 1);
        assert_eq!(
            conversation.last_message().map(|m| m.text.clone()),
            Some(if i % 2 == 0 {
                format!("question {}", i)
            } else {
                format!("answer {}", i)
            })
        );
        assert!(conversation.updated_at() >= conversation.created_at());
    }

    let json = serde_json::to_string(&conversation)?;
    let restored = Conversation::from_json(&json)?;
    assert_eq!(restored.creativity(), Some(Creativity::High));
    assert_eq!(restored.messages(), conversation.messages());
    Ok(())
}

#[test]
fn test_invalid_creativity_is_not_coerced() {
    let result = Conversation::from_value(json!({
        "id": "c1",
        "title": "t",
        "messages": [],
        "knowledge": [],
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z",
        "settings": { "creativity": "extreme" }
    }));
    assert!(matches!(result, Err(ModelError::InvalidEnum { .. })));
}

#[test]
fn test_function_message_contract() -> Result<()> {
    let call = FunctionCall::new("lookup_weather", r#"{"city":"Shanghai"}"#)?;
    assert!(matches!(
        ErnieMessage::function("", "{}", call.clone()),
        Err(ModelError::MalformedVariant(_))
    ));

    let msg = ErnieMessage::function("lookup_weather", r#"{"rain":false}"#, call)?;
    let encoded = serde_json::to_string(&msg)?;
    let decoded: ErnieMessage = serde_json::from_str(&encoded)?;
    assert_eq!(decoded.role(), MessageRole::Function);
    assert_eq!(decoded, msg);
    Ok(())
}

#[test]
fn test_empty_knowledge_item() -> Result<()> {
    let item = KnowledgeItem::new("k1", "Empty doc", "text")?;
    let value = serde_json::to_value(&item)?;
    assert_eq!(value["sections"], json!([]));
    let restored = KnowledgeItem::from_value(value)?;
    assert!(restored.sections.is_empty());
    Ok(())
}

#[test]
fn test_timestamps_only_move_forward() -> Result<()> {
    let mut conversation = Conversation::from_value(json!({
        "id": "c9",
        "title": "Clock skew",
        "messages": [],
        "knowledge": [],
        "createdAt": "2999-01-01T00:00:00Z",
        "updatedAt": "2999-01-01T00:00:00Z"
    }))?;
    let stamped = conversation.updated_at();

    conversation.push_message(Message::user("hello from the past"));
    conversation.set_title("Renamed");
    conversation.message_mut(0, |m| m.set_favorite(true));

    assert!(conversation.updated_at() >= stamped);
    assert!(conversation.updated_at() >= conversation.created_at());
    let message = &conversation.messages()[0];
    assert!(message.updated_at() >= message.created_at());
    Ok(())
}

#[test]
fn test_stream_reassembly_any_order() -> Result<()> {
    let chunks = [
        r#"{"id": "s1", "sentence_id": 0, "result": "A"}"#,
        r#"{"id": "s1", "sentence_id": 1, "result": "B"}"#,
        r#"{"id": "s1", "sentence_id": 2, "result": "C", "is_end": true}"#,
    ];
    let orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0], [2, 0, 1]];

    for order in orders {
        let mut assembler = StreamAssembler::new();
        for i in order {
            assembler.push(ChatResponse::from_json(chunks[i])?)?;
        }
        assert_eq!(assembler.finish()?.text(), "ABC");
    }
    Ok(())
}

#[test]
fn test_request_for_function_calling() -> Result<()> {
    let mut conversation = Conversation::new("c7", "Weather")?;
    conversation.push_message(Message::user("Weather in Shanghai?"));

    let request = ChatRequest::from_conversation(&conversation, None, &Config::default())?
        .with_functions(vec![FunctionSchema::new("lookup_weather", "Weather lookup")
            .with_property("city", PropertySchema::new("string"), true)]);
    request.validate()?;

    let value = serde_json::to_value(&request)?;
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["stream"], false);
    assert!(value.get("temperature").is_none());
    Ok(())
}
