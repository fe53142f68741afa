//! 输入数据树
//!
//! 输入是保持插入顺序的 `键 -> 值` 映射。点路径（`a.b.c`）用于验证器，
//! 方括号语法（`a[b][]=1`）用于查询串和表单字段。

use serde_json::{Map, Value};

/// 有序输入映射
pub type InputMap = Map<String, Value>;

/// 沿点路径读取，缺失的段返回 `None`
pub fn get_path<'a>(input: &'a InputMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = input.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// 沿点路径写入
///
/// 中间节点按需创建；已经存在的对象节点保留，非对象节点被替换为空对象。
pub fn set_path(output: &mut InputMap, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(output, &segments, value);
}

fn set_segments(map: &mut InputMap, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            if !child.is_object() {
                *child = Value::Object(InputMap::new());
            }
            if let Value::Object(child) = child {
                set_segments(child, rest, value);
            }
        }
    }
}

/// 右合并：`patch` 中的键覆盖 `base` 中的同名键，已有键保持原来的位置
pub fn merge(base: &mut InputMap, patch: InputMap) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

/// 解析 `application/x-www-form-urlencoded` 格式的字符串
pub fn parse_query(query: &str) -> InputMap {
    let mut map = InputMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        insert_bracketed(&mut map, &key, Value::String(value.into_owned()));
    }
    map
}

/// 按方括号语法插入，`a[b][c]` 写入 `{a: {b: {c: v}}}`，`a[]` 追加到数组
pub fn insert_bracketed(map: &mut InputMap, key: &str, value: Value) {
    let segments = split_brackets(key);
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        map.insert(first.to_string(), value);
        return;
    }

    let child = map.entry(first.to_string()).or_insert(Value::Null);
    insert_into(child, rest, value);
}

fn split_brackets(key: &str) -> Vec<&str> {
    match key.find('[') {
        Some(pos) if pos > 0 && key.ends_with(']') => {
            let mut segments = vec![&key[..pos]];
            segments.extend(key[pos + 1..key.len() - 1].split("]["));
            segments
        }
        _ => vec![key],
    }
}

fn empty_container(next_segment: &str) -> Value {
    if next_segment.is_empty() || next_segment == "0" {
        Value::Array(Vec::new())
    } else {
        Value::Object(InputMap::new())
    }
}

fn insert_into(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() && !node.is_array() {
        *node = empty_container(head);
    }

    if let Value::Array(items) = node {
        let index = head.parse::<usize>().ok();
        if head.is_empty() || index == Some(items.len()) {
            items.push(Value::Null);
            let last = items.len() - 1;
            insert_into(&mut items[last], rest, value);
            return;
        }
        if let Some(index) = index.filter(|i| *i < items.len()) {
            insert_into(&mut items[index], rest, value);
            return;
        }

        // 非数字键，退化为对象
        let converted: InputMap = items
            .drain(..)
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *node = Value::Object(converted);
    }

    if let Value::Object(map) = node {
        let key = if head.is_empty() {
            map.len().to_string()
        } else {
            head.to_string()
        };
        let child = map.entry(key).or_insert(Value::Null);
        insert_into(child, rest, value);
    }
}
